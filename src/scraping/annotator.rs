use crate::models::duration::{Band, DurationRecord, format_minutes};
use crate::scraping::page::TablePage;
use std::sync::Arc;
use tracing::{debug, warn};

/// What gets written onto a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Label { text: String, color: &'static str },
    /// Remove any label and reset the cell background.
    Clear,
}

impl Annotation {
    pub fn for_record(record: Option<DurationRecord>) -> Self {
        match record.and_then(|record| record.minutes()) {
            Some(minutes) => Annotation::Label {
                text: format_minutes(minutes),
                color: Band::for_minutes(minutes).color(),
            },
            None => Annotation::Clear,
        }
    }
}

pub struct Annotator {
    page: Arc<dyn TablePage>,
}

impl Annotator {
    pub fn new(page: Arc<dyn TablePage>) -> Self {
        Annotator { page }
    }

    /// Writes the label for `record` on the row; failures stay local to the row.
    pub async fn apply(&self, row: usize, record: Option<DurationRecord>) -> bool {
        let annotation = Annotation::for_record(record);
        match self.page.annotate(row, &annotation).await {
            Ok(true) => true,
            Ok(false) => {
                debug!("row {} vanished before it could be annotated", row);
                false
            }
            Err(e) => {
                warn!("failed to annotate row {}: {:?}", row, e);
                false
            }
        }
    }
}
