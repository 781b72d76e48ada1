use crate::cache::DurationCache;
use crate::distance::{DistanceMatrix, MatrixRequest};
use crate::models::address::{Destination, Origin, normalize_key};
use crate::models::duration::DurationRecord;
use crate::schedule::{CacheEpoch, Clock, next_monday_departure};
use crate::scraping::annotator::Annotator;
use crate::scraping::extractor::{RowAddress, classify, extract_origins};
use crate::scraping::page::TablePage;
use crate::settings::{Settings, SettingsDelta};
use crate::storage::StorageChanges;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Startup,
    TableChanged,
    SettingsChanged,
    Manual,
}

impl TriggerSource {
    fn is_automatic(&self) -> bool {
        !matches!(self, TriggerSource::Manual)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Completed(PassReport),
    /// A pass was already running; one follow-up pass is scheduled.
    Deferred,
    /// Auto-calculation is off or there is no destination.
    Disabled,
    Failed(String),
}

/// Entry point for anything that wants a pass to run.
#[async_trait]
pub trait Trigger: Send + Sync {
    async fn fire(&self, source: TriggerSource) -> TriggerOutcome;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub rows: usize,
    pub hits: usize,
    /// Distinct origins that were not cached.
    pub misses: usize,
    /// Data rows without an address, visually reset.
    pub reset: usize,
    pub remote_calls: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

/// Settings plus the re-entrancy flags, owned by the orchestrator.
#[derive(Debug, Default)]
pub struct OrchestratorContext {
    pub settings: Settings,
    running: bool,
    pending: Option<TriggerSource>,
}

impl OrchestratorContext {
    pub fn new(settings: Settings) -> Self {
        OrchestratorContext {
            settings,
            ..OrchestratorContext::default()
        }
    }

    /// Applies a delta; returns whether the change warrants a new pass.
    pub fn on_settings_changed(&mut self, delta: &SettingsDelta) -> bool {
        let before = self.settings.clone();
        self.settings.apply(delta);

        let destination_changed =
            normalize_key(&before.destination) != normalize_key(&self.settings.destination);
        let key_changed = before.api_key != self.settings.api_key;
        let switched_on = !before.auto_calculate && self.settings.auto_calculate;
        destination_changed || key_changed || switched_on
    }

    /// Whether the current settings let a pass from `source` run.
    fn admits(&self, source: TriggerSource) -> bool {
        if source.is_automatic() && !self.settings.auto_calculate {
            debug!("auto-calculate is off, ignoring {:?}", source);
            return false;
        }
        if Destination::parse(&self.settings.destination).is_none() {
            debug!("no destination configured, ignoring {:?}", source);
            return false;
        }
        true
    }

    /// Records a deferred trigger; a manual request outranks automatic ones.
    fn defer(&mut self, source: TriggerSource) {
        if self.pending != Some(TriggerSource::Manual) {
            self.pending = Some(source);
        }
    }
}

/// Clears the running flag when a pass ends, unwinds or is cancelled.
struct RunningGuard<'a> {
    context: &'a Mutex<OrchestratorContext>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut context = self.context.lock().unwrap_or_else(PoisonError::into_inner);
        context.running = false;
        context.pending = None;
    }
}

/// Uncached origins in request order, each bound to every row that shares it.
#[derive(Debug, Default)]
struct RowBindings {
    origins: Vec<Origin>,
    rows: Vec<Vec<usize>>,
    positions: HashMap<String, usize>,
}

impl RowBindings {
    fn bind(&mut self, origin: Origin, row: usize) {
        let key = origin.key();
        match self.positions.get(&key) {
            Some(&position) => self.rows[position].push(row),
            None => {
                self.positions.insert(key, self.origins.len());
                self.origins.push(origin);
                self.rows.push(vec![row]);
            }
        }
    }

    fn resolve(&self, origin_index: i64) -> Option<(&Origin, &[usize])> {
        let position = usize::try_from(origin_index).ok()?;
        Some((self.origins.get(position)?, self.rows.get(position)?.as_slice()))
    }

    fn len(&self) -> usize {
        self.origins.len()
    }

    fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

pub struct Orchestrator {
    page: Arc<dyn TablePage>,
    annotator: Annotator,
    client: Arc<dyn DistanceMatrix>,
    cache: DurationCache,
    clock: Arc<dyn Clock>,
    context: Mutex<OrchestratorContext>,
}

impl Orchestrator {
    pub fn new(
        page: Arc<dyn TablePage>,
        client: Arc<dyn DistanceMatrix>,
        cache: DurationCache,
        clock: Arc<dyn Clock>,
        settings: Settings,
    ) -> Self {
        Orchestrator {
            annotator: Annotator::new(Arc::clone(&page)),
            page,
            client,
            cache,
            clock,
            context: Mutex::new(OrchestratorContext::new(settings)),
        }
    }

    fn context(&self) -> MutexGuard<'_, OrchestratorContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> Settings {
        self.context().settings.clone()
    }

    pub fn on_settings_changed(&self, delta: &SettingsDelta) -> bool {
        self.context().on_settings_changed(delta)
    }

    /// Applies store notifications to the context until the store goes away.
    pub async fn follow_settings(self: Arc<Self>, mut changes: broadcast::Receiver<StorageChanges>) {
        loop {
            match changes.recv().await {
                Ok(changes) => {
                    let delta = SettingsDelta::from_changes(&changes);
                    if delta.is_empty() {
                        continue;
                    }
                    info!("settings changed: {:?}", delta.destination);
                    if self.on_settings_changed(&delta) {
                        self.fire(TriggerSource::SettingsChanged).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("missed {} settings notification(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    async fn run_pass(&self, settings: &Settings) -> Result<PassReport> {
        let destination =
            Destination::parse(&settings.destination).context("no destination configured")?;
        let now = self.clock.now();
        let mut store = self.cache.load(&CacheEpoch::for_time(now)).await;
        store.touch(&destination, now);

        let rows = self.page.rows().await.context("reading table rows")?;
        let mut report = PassReport {
            rows: rows.len(),
            ..PassReport::default()
        };

        let mut bindings = RowBindings::default();
        for (row, origin) in rows.iter().zip(extract_origins(&rows)) {
            let Some(origin) = origin else {
                if classify(row) == RowAddress::Missing {
                    self.annotator.apply(row.index, None).await;
                    report.reset += 1;
                }
                continue;
            };
            match store.lookup(&destination, &origin) {
                Some(record) => {
                    debug!("using cached value for {}", origin.as_str());
                    self.annotator.apply(row.index, Some(record)).await;
                    report.hits += 1;
                }
                None => bindings.bind(origin, row.index),
            }
        }

        report.misses = bindings.len();
        if bindings.is_empty() {
            info!("all values cached for destination {}", destination.as_str());
            return Ok(report);
        }

        let api_key = settings
            .api_key
            .clone()
            .context("no API key configured; cannot fetch uncached durations")?;
        let request = MatrixRequest {
            destination: destination.as_str().to_string(),
            origins: bindings
                .origins
                .iter()
                .map(|origin| origin.as_str().to_string())
                .collect(),
            api_key,
            departure: next_monday_departure(now),
        };
        info!(
            "requesting {} origin(s) for {}",
            request.origins.len(),
            request.destination
        );
        report.remote_calls += 1;
        let entries = self
            .client
            .compute_matrix(&request)
            .await
            .context("distance matrix request failed")?;

        for entry in entries {
            let Some((origin, bound_rows)) = bindings.resolve(entry.origin_index) else {
                warn!("missing origin for index {}", entry.origin_index);
                report.unresolved += 1;
                continue;
            };
            let record = match entry.duration_seconds {
                Some(seconds) => DurationRecord::Seconds(seconds),
                None => {
                    info!("no route for {}", origin.as_str());
                    DurationRecord::NoRoute
                }
            };
            store.upsert(&destination, origin, record);
            for &row in bound_rows {
                self.annotator.apply(row, Some(record)).await;
            }
            report.resolved += 1;
        }

        let store = self.cache.enforce_size_limit(store);
        self.cache.persist(&store).await;
        Ok(report)
    }
}

#[async_trait]
impl Trigger for Orchestrator {
    async fn fire(&self, source: TriggerSource) -> TriggerOutcome {
        {
            let mut context = self.context();
            if !context.admits(source) {
                return TriggerOutcome::Disabled;
            }
            if context.running {
                debug!("pass already running, deferring {:?}", source);
                context.defer(source);
                return TriggerOutcome::Deferred;
            }
            context.running = true;
        }
        let _running = RunningGuard {
            context: &self.context,
        };

        let mut source = source;
        loop {
            let settings = self.settings();
            let span = info_span!("pass", id = %Uuid::new_v4(), source = ?source);
            let outcome = match self.run_pass(&settings).instrument(span).await {
                Ok(report) => {
                    info!("pass finished: {:?}", report);
                    TriggerOutcome::Completed(report)
                }
                Err(e) => {
                    error!("pass failed: {:?}", e);
                    TriggerOutcome::Failed(format!("{:#}", e))
                }
            };

            let mut context = self.context();
            match context.pending.take() {
                Some(next) if context.admits(next) => source = next,
                _ => return outcome,
            }
        }
    }
}
