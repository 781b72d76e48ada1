use crate::handlers::AppState;
use crate::handlers::run::run_now;
use actix_web::{HttpResponse, Responder, post, web};

#[post("/now")]
async fn now(state: web::Data<AppState>) -> impl Responder {
    run_now(&state);
    HttpResponse::Accepted().body("Pass scheduled.")
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.service(now);
}
