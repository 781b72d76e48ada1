use crate::config::AppConfig;
use crate::storage::{KeyValueStore, StorageChanges};
use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

pub const API_KEY: &str = "apiKey";
pub const DESTINATION: &str = "destination";
pub const AUTO_CALCULATE: &str = "autoCalculate";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub destination: String,
    pub auto_calculate: bool,
}

/// Partial update delivered by a store change notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDelta {
    pub api_key: Option<String>,
    pub destination: Option<String>,
    pub auto_calculate: Option<bool>,
}

impl SettingsDelta {
    pub fn from_changes(changes: &StorageChanges) -> Self {
        SettingsDelta {
            api_key: changes
                .get(API_KEY)
                .and_then(|change| change.new_value.as_str())
                .map(str::to_string),
            destination: changes
                .get(DESTINATION)
                .and_then(|change| change.new_value.as_str())
                .map(str::to_string),
            auto_calculate: changes
                .get(AUTO_CALCULATE)
                .and_then(|change| change.new_value.as_bool()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.api_key.is_none() && self.destination.is_none() && self.auto_calculate.is_none()
    }
}

impl Settings {
    pub fn apply(&mut self, delta: &SettingsDelta) {
        if let Some(api_key) = &delta.api_key {
            self.api_key = Some(api_key.clone()).filter(|key| !key.trim().is_empty());
        }
        if let Some(destination) = &delta.destination {
            self.destination = destination.clone();
        }
        if let Some(auto_calculate) = delta.auto_calculate {
            self.auto_calculate = auto_calculate;
        }
    }
}

/// Writes environment seeds, then reads back the effective settings.
/// Stored values win, except the API key which the environment always injects.
pub async fn load_settings(store: &dyn KeyValueStore, config: &AppConfig) -> Result<Settings> {
    let stored = store.get(&[API_KEY, DESTINATION, AUTO_CALCULATE]).await?;

    let mut seeds = HashMap::new();
    if let Some(api_key) = &config.api_key {
        seeds.insert(API_KEY.to_string(), json!(api_key));
    }
    if !stored.contains_key(DESTINATION) {
        seeds.insert(DESTINATION.to_string(), json!(config.default_destination));
    }
    if !stored.contains_key(AUTO_CALCULATE) {
        seeds.insert(AUTO_CALCULATE.to_string(), json!(config.auto_calculate));
    }
    if !seeds.is_empty() {
        store.set(seeds).await?;
    }

    let values = store.get(&[API_KEY, DESTINATION, AUTO_CALCULATE]).await?;
    let settings = Settings {
        api_key: values
            .get(API_KEY)
            .and_then(Value::as_str)
            .filter(|key| !key.trim().is_empty())
            .map(str::to_string),
        destination: values
            .get(DESTINATION)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        auto_calculate: values
            .get(AUTO_CALCULATE)
            .and_then(Value::as_bool)
            .unwrap_or(false),
    };
    info!(
        "settings loaded: destination={:?} auto_calculate={} api_key_configured={}",
        settings.destination,
        settings.auto_calculate,
        settings.api_key.is_some()
    );
    Ok(settings)
}

/// Persists a value only after edits have paused for `delay`; the last edit wins.
#[derive(Clone)]
pub struct DebouncedWriter {
    store: Arc<dyn KeyValueStore>,
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl DebouncedWriter {
    pub fn new(store: Arc<dyn KeyValueStore>, delay: Duration) -> Self {
        DebouncedWriter {
            store,
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn submit(&self, key: &str, value: Value) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = Arc::clone(&self.generation);
        let store = Arc::clone(&self.store);
        let delay = self.delay;
        let key = key.to_string();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if latest.load(Ordering::SeqCst) != generation {
                return;
            }
            if let Err(e) = store.set(HashMap::from([(key.clone(), value)])).await {
                warn!("failed to persist {}: {:?}", key, e);
            }
        });
    }
}
