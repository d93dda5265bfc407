use chrono::{DateTime, Utc};

use crate::config::FilterConfig;
use crate::event::Event;

/// Why an event was left off the roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    MissingTime,
    MissingLocation,
    MetaLocation(String),
    ExcludedTerm(String),
    AlreadyStarted,
}

/// Outcome of classifying one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Rejected(RejectReason),
    /// Kept on the roster; only allow-listed venues get a monitor
    Accepted { needs_monitor: bool },
}

impl Verdict {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }

    pub fn needs_monitor(&self) -> bool {
        matches!(self, Verdict::Accepted { needs_monitor: true })
    }
}

/// Classifies events as eligible or not for the roster.
/// Matching is case-insensitive throughout, so patterns are lowercased once.
#[derive(Debug, Clone)]
pub struct EventFilter {
    exclusion_terms: Vec<String>,
    meta_locations: Vec<String>,
    monitor_locations: Vec<String>,
    future_only: bool,
}

fn lowered(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `needle` occurs in `haystack` with no letter or digit directly on either side
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(at, found)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + found.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

impl EventFilter {
    pub fn new(config: &FilterConfig, future_only: bool) -> Self {
        Self {
            exclusion_terms: lowered(&config.exclusion_terms),
            meta_locations: lowered(&config.meta_locations),
            monitor_locations: lowered(&config.monitor_locations),
            future_only,
        }
    }

    /// Applies the rules in order; the first rejection wins
    pub fn classify(&self, event: &Event, now: DateTime<Utc>) -> Verdict {
        let start = match (event.start, event.end) {
            (Some(start), Some(_)) => start,
            _ => return Verdict::Rejected(RejectReason::MissingTime),
        };

        let location = event.location_str().to_lowercase();
        if location.is_empty() {
            return Verdict::Rejected(RejectReason::MissingLocation);
        }
        if let Some(meta) = self
            .meta_locations
            .iter()
            .find(|m| contains_phrase(&location, m.as_str())) {
            return Verdict::Rejected(RejectReason::MetaLocation(meta.clone()));
        }

        let summary = event.summary.to_lowercase();
        let description = event.description.as_deref().unwrap_or("").to_lowercase();
        let excluded = self.exclusion_terms.iter().find(|term| {
            summary.contains(term.as_str())
                || description.contains(term.as_str())
                || location.contains(term.as_str())
        });
        if let Some(term) = excluded {
            return Verdict::Rejected(RejectReason::ExcludedTerm(term.clone()));
        }

        if self.future_only && start < now {
            return Verdict::Rejected(RejectReason::AlreadyStarted);
        }

        Verdict::Accepted {
            needs_monitor: self.monitor_locations.iter().any(|m| *m == location),
        }
    }

    pub fn is_eligible(&self, event: &Event, now: DateTime<Utc>) -> bool {
        self.classify(event, now).is_eligible()
    }
}
