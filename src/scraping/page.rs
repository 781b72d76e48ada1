use crate::config::AppConfig;
use crate::models::row::RawRow;
use crate::scraping::annotator::Annotation;
use crate::scraping::constants::*;
use crate::scraping::extractor::parse_rows;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use thirtyfour::prelude::*;
use tracing::info;

/// The host page as seen by a pass: read rows, write one row, observe changes.
#[async_trait]
pub trait TablePage: Send + Sync {
    async fn rows(&self) -> Result<Vec<RawRow>>;

    /// Returns `false` when the row no longer exists.
    async fn annotate(&self, row: usize, annotation: &Annotation) -> Result<bool>;

    /// Monotonic counter bumped by table mutations other than our own labels.
    async fn mutation_version(&self) -> Result<u64>;
}

const ANNOTATE_JS: &str = r#"
    const [index, label, color, rowSel, nameSel, cellSel, labelClass] = arguments;
    const row = document.querySelectorAll(rowSel)[index];
    if (!row) return false;
    const name = row.querySelector(nameSel);
    if (!name) return false;
    row.querySelectorAll('.' + labelClass).forEach((el) => el.remove());
    const cell = name.closest(cellSel);
    if (label === null) {
        if (cell) cell.style.backgroundColor = '';
        return true;
    }
    const el = document.createElement('strong');
    el.className = labelClass;
    el.textContent = label;
    el.style.marginLeft = '6px';
    name.appendChild(el);
    if (cell) cell.style.backgroundColor = color;
    return true;
"#;

const MUTATION_VERSION_JS: &str = r#"
    const [containerSel, labelClass] = arguments;
    if (!window.__transitObserver) {
        window.__transitVersion = 0;
        const isLabel = (node) => node.nodeType === 1 && node.classList.contains(labelClass);
        const target = document.querySelector(containerSel) || document.body;
        window.__transitObserver = new MutationObserver((records) => {
            const foreign = records.some((r) =>
                r.type === 'childList' &&
                ![...r.addedNodes, ...r.removedNodes].every(isLabel));
            if (foreign) window.__transitVersion += 1;
        });
        window.__transitObserver.observe(target, { childList: true, subtree: true });
    }
    return window.__transitVersion;
"#;

pub struct WebDriverPage {
    driver: WebDriver,
}

impl WebDriverPage {
    pub fn new(driver: WebDriver) -> Self {
        WebDriverPage { driver }
    }
}

#[async_trait]
impl TablePage for WebDriverPage {
    async fn rows(&self) -> Result<Vec<RawRow>> {
        let html = self.driver.source().await?;
        Ok(parse_rows(&html))
    }

    async fn annotate(&self, row: usize, annotation: &Annotation) -> Result<bool> {
        let (label, color) = match annotation {
            Annotation::Label { text, color } => (json!(text), json!(color)),
            Annotation::Clear => (Value::Null, Value::Null),
        };
        let args: Vec<Value> = vec![
            json!(row),
            label,
            color,
            json!(ROW_SELECTOR),
            json!(NAME_LINK_SELECTOR),
            json!(CELL_SELECTOR),
            json!(LABEL_CLASS),
        ];
        let ret = self.driver.execute(ANNOTATE_JS, Arc::from(args)).await?;
        Ok(ret.json().as_bool().unwrap_or(false))
    }

    async fn mutation_version(&self) -> Result<u64> {
        let args: Vec<Value> = vec![json!(TABLE_CONTAINER_SELECTOR), json!(LABEL_CLASS)];
        let ret = self
            .driver
            .execute(MUTATION_VERSION_JS, Arc::from(args))
            .await?;
        Ok(ret.json().as_u64().unwrap_or(0))
    }
}

/// Opens a Chrome session on the CRM table.
pub async fn open_session(config: &AppConfig) -> WebDriverResult<WebDriver> {
    let mut caps = DesiredCapabilities::chrome();
    if config.headless {
        caps.set_headless()?;
    }
    caps.add_arg("--no-sandbox")?;
    caps.add_arg("--disable-dev-shm-usage")?;
    caps.add_arg("--disable-notifications")?;
    caps.add_arg("--no-first-run")?;
    caps.add_arg("--disable-default-apps")?;

    let driver = WebDriver::new(config.webdriver_url.as_str(), caps).await?;
    driver
        .set_window_rect(0, 0, WINDOW_WIDTH, WINDOW_HEIGHT)
        .await?;

    info!("opening {}", config.target_url);
    driver.goto(config.target_url.as_str()).await?;

    Ok(driver)
}
