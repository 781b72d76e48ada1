pub mod cache;
pub mod run;
pub mod settings;

use crate::cache::DurationCache;
use crate::orchestrator::Trigger;
use crate::schedule::Clock;
use crate::settings::DebouncedWriter;
use crate::storage::KeyValueStore;
use std::sync::Arc;

/// Shared with every actix worker through `web::Data`.
pub struct AppState {
    pub store: Arc<dyn KeyValueStore>,
    pub trigger: Arc<dyn Trigger>,
    pub cache: Arc<DurationCache>,
    pub clock: Arc<dyn Clock>,
    pub writer: DebouncedWriter,
}
