use crate::handlers::AppState;
use crate::settings::{API_KEY, AUTO_CALCULATE, DESTINATION};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub destination: String,
    pub auto_calculate: bool,
    pub api_key_configured: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub destination: Option<String>,
    pub auto_calculate: Option<bool>,
}

pub async fn read_settings(state: &AppState) -> Result<SettingsView> {
    let values = state.store.get(&[API_KEY, DESTINATION, AUTO_CALCULATE]).await?;
    Ok(SettingsView {
        destination: values
            .get(DESTINATION)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        auto_calculate: values
            .get(AUTO_CALCULATE)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        api_key_configured: values
            .get(API_KEY)
            .and_then(Value::as_str)
            .is_some_and(|key| !key.trim().is_empty()),
    })
}

/// The toggle is saved at once; destination typing is debounced.
pub async fn update_settings(state: &AppState, update: SettingsUpdate) -> Result<()> {
    if let Some(auto_calculate) = update.auto_calculate {
        state
            .store
            .set(HashMap::from([(
                AUTO_CALCULATE.to_string(),
                json!(auto_calculate),
            )]))
            .await?;
    }
    if let Some(destination) = update.destination {
        state.writer.submit(DESTINATION, json!(destination));
    }
    Ok(())
}
