use crate::handlers::AppState;
use crate::orchestrator::{TriggerOutcome, TriggerSource};
use std::sync::Arc;
use tokio::task;

/// Starts a manual pass in the background.
pub fn run_now(state: &AppState) {
    let trigger = Arc::clone(&state.trigger);
    task::spawn(async move {
        match trigger.fire(TriggerSource::Manual).await {
            TriggerOutcome::Completed(report) => {
                tracing::info!("manual pass completed: {:?}", report)
            }
            TriggerOutcome::Deferred => tracing::info!("manual pass queued behind running pass"),
            TriggerOutcome::Disabled => tracing::warn!("manual pass skipped: no destination"),
            TriggerOutcome::Failed(e) => tracing::error!("manual pass failed: {}", e),
        }
    });
}
