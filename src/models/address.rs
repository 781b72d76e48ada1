use serde::Serialize;

/// Cache keys are trimmed and lower-cased so lookups ignore casing and padding.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Address derived from a table row, kept in its display casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Origin(String);

impl Origin {
    pub fn new(display: impl Into<String>) -> Self {
        Origin(display.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn key(&self) -> String {
        normalize_key(&self.0)
    }
}

/// Configured target address shared by every row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination(String);

impl Destination {
    /// Returns `None` when the configured text is blank.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Destination(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn key(&self) -> String {
        normalize_key(&self.0)
    }
}
