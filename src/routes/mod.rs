pub mod cache;
pub mod health;
pub mod run;
pub mod settings;

use actix_web::web;

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/health").configure(health::init))
        .service(web::scope("/settings").configure(settings::init))
        .service(web::scope("/run").configure(run::init))
        .service(web::scope("/cache").configure(cache::init));
}
