use crate::config::AppConfig;
use crate::distance::{DistanceError, DistanceMatrix, MatrixEntry, MatrixRequest};
use crate::models::row::RawRow;
use crate::schedule::Clock;
use crate::scraping::annotator::Annotation;
use crate::scraping::page::TablePage;
use crate::watcher::DetectionStrategy;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use url::Url;

pub fn test_config() -> AppConfig {
    AppConfig {
        target_url: Url::parse("https://crm.example.test/people").unwrap(),
        webdriver_url: "http://localhost:60103".to_string(),
        headless: true,
        store_path: PathBuf::from("unused.json"),
        bind_host: "127.0.0.1".to_string(),
        bind_port: 0,
        api_key: None,
        default_destination: "Puerta del Sol, Madrid".to_string(),
        auto_calculate: true,
        watch_strategy: DetectionStrategy::PollSignature {
            interval: Duration::from_secs(1),
        },
        routes_endpoint: Url::parse("http://127.0.0.1:9/matrix").unwrap(),
        language_code: Some("es".to_string()),
        request_timeout: Duration::from_secs(5),
        cache_soft_limit_bytes: 3_670_016,
        cache_hard_limit_bytes: 4 * 1024 * 1024,
    }
}

/// Data row at `index` with the given street and city.
pub fn row(index: usize, street: &str, city: &str) -> RawRow {
    let non_empty = |s: &str| Some(s.to_string()).filter(|s| !s.is_empty());
    RawRow {
        index,
        has_name: true,
        street: non_empty(street),
        city: non_empty(city),
        text: format!("Person {} {} {}", index, street, city),
    }
}

/// Monday 2026-10-19 10:00 UTC, ISO week 2026-W43.
pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        FixedClock(Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Default)]
pub struct FakePage {
    rows: Mutex<Vec<RawRow>>,
    annotations: Mutex<HashMap<usize, Annotation>>,
    writes: AtomicUsize,
    reads: AtomicUsize,
    version: AtomicU64,
}

impl FakePage {
    pub fn with_rows(rows: Vec<RawRow>) -> Self {
        FakePage {
            rows: Mutex::new(rows),
            ..FakePage::default()
        }
    }

    pub fn set_rows(&self, rows: Vec<RawRow>) {
        *self.rows.lock().unwrap() = rows;
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn annotation(&self, row: usize) -> Option<Annotation> {
        self.annotations.lock().unwrap().get(&row).cloned()
    }

    pub fn annotations(&self) -> HashMap<usize, Annotation> {
        self.annotations.lock().unwrap().clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TablePage for FakePage {
    async fn rows(&self) -> Result<Vec<RawRow>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn annotate(&self, row: usize, annotation: &Annotation) -> Result<bool> {
        if !self.rows.lock().unwrap().iter().any(|r| r.index == row) {
            return Ok(false);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.annotations
            .lock()
            .unwrap()
            .insert(row, annotation.clone());
        Ok(true)
    }

    async fn mutation_version(&self) -> Result<u64> {
        Ok(self.version.load(Ordering::SeqCst))
    }
}

type Responder = Box<dyn Fn(&MatrixRequest) -> Result<Vec<MatrixEntry>, DistanceError> + Send + Sync>;

/// Scripted distance service that records every request.
pub struct FakeDistance {
    respond: Responder,
    requests: Mutex<Vec<MatrixRequest>>,
    gate: Option<std::sync::Arc<Notify>>,
}

impl FakeDistance {
    pub fn new(
        respond: impl Fn(&MatrixRequest) -> Result<Vec<MatrixEntry>, DistanceError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        FakeDistance {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Answers every origin with `seconds_for(origin)` in request order.
    pub fn answering(seconds_for: impl Fn(&str) -> Option<u64> + Send + Sync + 'static) -> Self {
        Self::new(move |request| {
            Ok(request
                .origins
                .iter()
                .enumerate()
                .map(|(i, origin)| MatrixEntry {
                    origin_index: i as i64,
                    duration_seconds: seconds_for(origin.as_str()),
                })
                .collect())
        })
    }

    /// Holds each call until the gate is notified.
    pub fn gated(mut self, gate: std::sync::Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<MatrixRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DistanceMatrix for FakeDistance {
    async fn compute_matrix(
        &self,
        request: &MatrixRequest,
    ) -> Result<Vec<MatrixEntry>, DistanceError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        (self.respond)(request)
    }
}
