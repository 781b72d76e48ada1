use crate::handlers::AppState;
use crate::handlers::cache::cache_stats;
use actix_web::{HttpResponse, Responder, get, web};

#[get("/stats")]
async fn stats(state: web::Data<AppState>) -> impl Responder {
    match cache_stats(&state).await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => HttpResponse::InternalServerError().body(format!("Error: {}", e)),
    }
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.service(stats);
}
