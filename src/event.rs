use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar event as delivered by a team's feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Stable identity (the feed's UID)
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Start/end were dates rather than date-times
    pub all_day: bool,
}

impl Event {
    pub fn new(uid: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            summary: summary.into(),
            description: None,
            location: None,
            start: None,
            end: None,
            all_day: false,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_times(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Trimmed location, empty when absent
    pub fn location_str(&self) -> &str {
        self.location.as_deref().map(str::trim).unwrap_or("")
    }

    /// Duration in whole minutes, if both times are known
    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some((end - start).num_minutes()),
            _ => None,
        }
    }
}
