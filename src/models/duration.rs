use serde::Serialize;

/// Travel time for one (destination, origin) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DurationRecord {
    Seconds(u64),
    /// The service answered but had no route for this origin.
    NoRoute,
}

impl DurationRecord {
    /// Whole minutes, rounded half up.
    pub fn minutes(&self) -> Option<u64> {
        match self {
            DurationRecord::Seconds(seconds) => Some(seconds.saturating_add(30) / 60),
            DurationRecord::NoRoute => None,
        }
    }
}

/// Urgency bands used to color a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Band {
    Short,
    Moderate,
    Long,
    VeryLong,
}

impl Band {
    pub fn for_minutes(minutes: u64) -> Self {
        match minutes {
            0..=25 => Band::Short,
            26..=40 => Band::Moderate,
            41..=60 => Band::Long,
            _ => Band::VeryLong,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Band::Short => "#ccffcc",
            Band::Moderate => "#e5ccff",
            Band::Long => "#ffe5cc",
            Band::VeryLong => "#ffcccc",
        }
    }
}

pub fn format_minutes(minutes: u64) -> String {
    let hours = minutes / 60;
    if hours > 0 {
        format!("{}h {}min", hours, minutes % 60)
    } else {
        format!("{} min", minutes)
    }
}
