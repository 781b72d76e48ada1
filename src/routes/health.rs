use crate::handlers::AppState;
use actix_web::{HttpResponse, Responder, get, web};

#[get("/ping")]
async fn ping() -> impl Responder {
    HttpResponse::Ok().body("pong")
}

/// Reports whether the key-value store answers reads.
#[get("/store")]
async fn store(state: web::Data<AppState>) -> impl Responder {
    match state.store.get(&[]).await {
        Ok(_) => HttpResponse::Ok().body("ok"),
        Err(e) => HttpResponse::ServiceUnavailable().body(format!("Error: {}", e)),
    }
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.service(ping).service(store);
}
