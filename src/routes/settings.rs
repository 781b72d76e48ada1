use crate::handlers::AppState;
use crate::handlers::settings::{SettingsUpdate, read_settings, update_settings};
use actix_web::{HttpResponse, Responder, get, put, web};

#[get("")]
async fn show(state: web::Data<AppState>) -> impl Responder {
    match read_settings(&state).await {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(e) => HttpResponse::InternalServerError().body(format!("Error: {}", e)),
    }
}

#[put("")]
async fn update(state: web::Data<AppState>, body: web::Json<SettingsUpdate>) -> impl Responder {
    match update_settings(&state, body.into_inner()).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => {
            tracing::error!("failed to update settings: {:?}", e);
            HttpResponse::InternalServerError().body("Failed to update settings.")
        }
    }
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.service(show).service(update);
}
