use crate::watcher::DetectionStrategy;
use anyhow::{Context, Result, anyhow};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_ROUTES_ENDPOINT: &str =
    "https://routes.googleapis.com/distanceMatrix/v2:computeRouteMatrix";
pub const DEFAULT_DESTINATION: &str = "Puerta del Sol, Madrid";

// chrome.storage.local allows 4MB; we clean up past 3.5MB
pub const CACHE_HARD_LIMIT_BYTES: usize = 4 * 1024 * 1024;
pub const CACHE_SOFT_LIMIT_BYTES: usize = 3_670_016;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub target_url: Url,
    pub webdriver_url: String,
    pub headless: bool,
    pub store_path: PathBuf,
    pub bind_host: String,
    pub bind_port: u16,
    pub api_key: Option<String>,
    pub default_destination: String,
    pub auto_calculate: bool,
    pub watch_strategy: DetectionStrategy,
    pub routes_endpoint: Url,
    pub language_code: Option<String>,
    pub request_timeout: Duration,
    pub cache_soft_limit_bytes: usize,
    pub cache_hard_limit_bytes: usize,
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {}={:?}: {}", key, raw, e)),
        _ => Ok(default),
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let target_url = env_opt("TARGET_URL").context("TARGET_URL must be set")?;
        let target_url = Url::parse(&target_url).context("TARGET_URL is not a valid URL")?;
        let routes_endpoint = Url::parse(&env_or(
            "ROUTES_ENDPOINT",
            DEFAULT_ROUTES_ENDPOINT.to_string(),
        )?)
        .context("ROUTES_ENDPOINT is not a valid URL")?;

        let interval = Duration::from_millis(env_or("WATCH_INTERVAL_MS", 1000)?);
        let debounce = Duration::from_millis(env_or("WATCH_DEBOUNCE_MS", 650)?);
        let watch_strategy =
            DetectionStrategy::from_name(&env_or("WATCH_STRATEGY", "poll".to_string())?, interval, debounce)?;

        let cache_hard_limit_bytes = env_or("CACHE_HARD_LIMIT_BYTES", CACHE_HARD_LIMIT_BYTES)?;
        let cache_soft_limit_bytes = env_or("CACHE_SOFT_LIMIT_BYTES", CACHE_SOFT_LIMIT_BYTES)?;
        if cache_soft_limit_bytes > cache_hard_limit_bytes {
            return Err(anyhow!(
                "CACHE_SOFT_LIMIT_BYTES ({}) exceeds CACHE_HARD_LIMIT_BYTES ({})",
                cache_soft_limit_bytes,
                cache_hard_limit_bytes
            ));
        }

        Ok(AppConfig {
            target_url,
            webdriver_url: env_or("WEBDRIVER_URL", "http://localhost:60103".to_string())?,
            headless: env_or("HEADLESS", false)?,
            store_path: PathBuf::from(env_or("STORE_PATH", "transit_store.json".to_string())?),
            bind_host: env_or("BIND_HOST", "127.0.0.1".to_string())?,
            bind_port: env_or("BIND_PORT", 8080)?,
            api_key: env_opt("GOOGLE_MAPS_API_KEY"),
            default_destination: env_or("DEFAULT_DESTINATION", DEFAULT_DESTINATION.to_string())?,
            auto_calculate: env_or("AUTO_CALCULATE", true)?,
            watch_strategy,
            routes_endpoint,
            language_code: Some(env_or("ROUTES_LANGUAGE", "es".to_string())?)
                .filter(|code| code != "none"),
            request_timeout: Duration::from_secs(env_or("REQUEST_TIMEOUT_SECS", 20)?),
            cache_soft_limit_bytes,
            cache_hard_limit_bytes,
        })
    }
}
