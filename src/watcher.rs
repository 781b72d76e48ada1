use crate::orchestrator::{Trigger, TriggerSource};
use crate::scraping::extractor::signature;
use crate::scraping::page::TablePage;
use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

const READY_POLL: Duration = Duration::from_millis(300);
const MUTATION_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionStrategy {
    /// Compare a cheap fingerprint of the rows every `interval`.
    PollSignature { interval: Duration },
    /// Follow a page-side mutation counter; fire once it has settled for `debounce`.
    Mutation { debounce: Duration },
}

impl DetectionStrategy {
    pub fn from_name(name: &str, interval: Duration, debounce: Duration) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "poll" => Ok(DetectionStrategy::PollSignature { interval }),
            "mutation" => Ok(DetectionStrategy::Mutation { debounce }),
            other => Err(anyhow!(
                "unknown WATCH_STRATEGY {:?} (expected \"poll\" or \"mutation\")",
                other
            )),
        }
    }
}

#[derive(Debug, Default)]
pub struct SignatureDetector {
    last: Option<String>,
}

impl SignatureDetector {
    /// True when `current` differs from the previous observation.
    pub fn observe(&mut self, current: String) -> bool {
        if self.last.as_deref() == Some(current.as_str()) {
            return false;
        }
        let first = self.last.is_none();
        self.last = Some(current);
        !first
    }
}

#[derive(Debug)]
pub struct DebounceDetector {
    debounce: Duration,
    seen: u64,
    handled: u64,
    changed_at: Option<Instant>,
}

impl DebounceDetector {
    pub fn new(debounce: Duration, version: u64) -> Self {
        DebounceDetector {
            debounce,
            seen: version,
            handled: version,
            changed_at: None,
        }
    }

    /// True once per burst, after the counter has been quiet for the debounce delay.
    pub fn observe(&mut self, version: u64, now: Instant) -> bool {
        if version != self.seen {
            self.seen = version;
            self.changed_at = Some(now);
            return false;
        }
        match self.changed_at {
            Some(at) if self.seen != self.handled && now.duration_since(at) >= self.debounce => {
                self.handled = self.seen;
                self.changed_at = None;
                true
            }
            _ => false,
        }
    }
}

pub struct ChangeWatcher {
    page: Arc<dyn TablePage>,
    trigger: Arc<dyn Trigger>,
    strategy: DetectionStrategy,
}

impl ChangeWatcher {
    pub fn new(
        page: Arc<dyn TablePage>,
        trigger: Arc<dyn Trigger>,
        strategy: DetectionStrategy,
    ) -> Self {
        ChangeWatcher {
            page,
            trigger,
            strategy,
        }
    }

    /// Waits for the table, runs the startup pass, then re-triggers on every change.
    pub async fn run(self) {
        let initial = self.wait_for_rows().await;
        info!("table ready with {} row(s)", initial);

        match self.strategy.clone() {
            DetectionStrategy::PollSignature { interval: every } => {
                let mut detector = SignatureDetector::default();
                if let Ok(rows) = self.page.rows().await {
                    detector.observe(signature(&rows));
                }
                self.trigger.fire(TriggerSource::Startup).await;
                self.poll_signature(every, detector).await;
            }
            DetectionStrategy::Mutation { debounce } => {
                let version = self.page.mutation_version().await.unwrap_or_else(|e| {
                    warn!("could not install mutation observer: {:?}", e);
                    0
                });
                self.trigger.fire(TriggerSource::Startup).await;
                self.follow_mutations(DebounceDetector::new(debounce, version))
                    .await;
            }
        }
    }

    async fn wait_for_rows(&self) -> usize {
        let mut ticker = interval(READY_POLL);
        loop {
            ticker.tick().await;
            match self.page.rows().await {
                Ok(rows) if !rows.is_empty() => return rows.len(),
                Ok(_) => {}
                Err(e) => debug!("table not readable yet: {:?}", e),
            }
        }
    }

    async fn poll_signature(&self, every: Duration, mut detector: SignatureDetector) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let rows = match self.page.rows().await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("failed to read table: {:?}", e);
                    continue;
                }
            };
            if detector.observe(signature(&rows)) {
                info!("detected table content change, refreshing");
                self.trigger.fire(TriggerSource::TableChanged).await;
            }
        }
    }

    async fn follow_mutations(&self, mut detector: DebounceDetector) {
        let mut ticker = interval(MUTATION_POLL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let version = match self.page.mutation_version().await {
                Ok(version) => version,
                Err(e) => {
                    warn!("failed to read mutation counter: {:?}", e);
                    continue;
                }
            };
            if detector.observe(version, Instant::now()) {
                info!("table mutated, refreshing");
                self.trigger.fire(TriggerSource::TableChanged).await;
            }
        }
    }
}
