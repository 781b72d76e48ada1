mod cache;
mod config;
mod distance;
mod handlers;
mod models;
mod orchestrator;
mod routes;
mod schedule;
mod scraping;
mod settings;
mod storage;
#[cfg(test)]
mod test_support;
mod watcher;

use actix_web::{App, HttpServer, web};
use anyhow::Context;
use cache::DurationCache;
use config::AppConfig;
use distance::RoutesClient;
use dotenv::dotenv;
use handlers::AppState;
use orchestrator::Orchestrator;
use schedule::SystemClock;
use scraping::page::{WebDriverPage, open_session};
use settings::{DebouncedWriter, load_settings};
use std::sync::Arc;
use std::time::Duration;
use storage::{FileStore, KeyValueStore, MemoryStore};
use watcher::ChangeWatcher;

const DESTINATION_DEBOUNCE: Duration = Duration::from_millis(800);
const IN_MEMORY_STORE: &str = ":memory:";

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    dotenv().ok();

    let config = AppConfig::from_env()?;
    let store: Arc<dyn KeyValueStore> = if config.store_path.as_os_str() == IN_MEMORY_STORE {
        tracing::warn!("using in-memory store; settings and cache are lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::open(&config.store_path)?)
    };
    let settings_changes = store.subscribe();
    let settings = load_settings(store.as_ref(), &config).await?;

    let driver = open_session(&config)
        .await
        .context("failed to open WebDriver session")?;
    let page = Arc::new(WebDriverPage::new(driver.clone()));
    let client = Arc::new(RoutesClient::new(
        config.routes_endpoint.clone(),
        config.request_timeout,
        config.language_code.clone(),
    )?);
    let clock = Arc::new(SystemClock);

    let orchestrator = Arc::new(Orchestrator::new(
        page.clone(),
        client,
        DurationCache::new(
            Arc::clone(&store),
            config.cache_soft_limit_bytes,
            config.cache_hard_limit_bytes,
        ),
        clock.clone(),
        settings,
    ));

    tokio::spawn(Arc::clone(&orchestrator).follow_settings(settings_changes));
    tokio::spawn(
        ChangeWatcher::new(page, orchestrator.clone(), config.watch_strategy.clone()).run(),
    );

    let state = web::Data::new(AppState {
        store: Arc::clone(&store),
        trigger: orchestrator,
        cache: Arc::new(DurationCache::new(
            Arc::clone(&store),
            config.cache_soft_limit_bytes,
            config.cache_hard_limit_bytes,
        )),
        clock,
        writer: DebouncedWriter::new(store, DESTINATION_DEBOUNCE),
    });

    tracing::info!(
        "settings surface on http://{}:{}",
        config.bind_host,
        config.bind_port
    );
    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes::init))
        .bind((config.bind_host.as_str(), config.bind_port))?
        .run()
        .await?;

    tracing::info!("quitting Chrome session");
    driver.quit().await?;
    Ok(())
}
