pub mod ics;

use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::TeamConfig;
use crate::error::{Result, RosterError};
use crate::event::Event;

pub use ics::{parse_ics, IcsError};

/// Where a team's calendar comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLocation {
    Url(String),
    File(PathBuf),
}

impl FeedLocation {
    pub fn parse(feed: &str) -> Self {
        let feed = feed.trim();
        let lower = feed.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(feed.to_string())
        } else {
            Self::File(PathBuf::from(feed))
        }
    }
}

/// Builds the HTTP client shared by every team in a run
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("lrm-roster/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| RosterError::Config(format!("cannot build HTTP client: {}", e)))
}

/// A team's calendar feed
#[derive(Debug, Clone)]
pub struct CalendarSource {
    team: String,
    location: FeedLocation,
    tz: Tz,
}

impl CalendarSource {
    pub fn new(team: &TeamConfig, tz: Tz) -> Self {
        Self {
            team: team.name.clone(),
            location: FeedLocation::parse(&team.feed),
            tz,
        }
    }

    /// Retrieves the raw feed body
    pub async fn fetch(&self, client: &reqwest::Client) -> Result<String> {
        let unavailable = |reason: String| RosterError::source_unavailable(&self.team, reason);

        match &self.location {
            FeedLocation::Url(url) => {
                tracing::debug!(team = %self.team, url = %url, "Fetching calendar feed");
                let response = client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| unavailable(e.to_string()))?;
                response.text().await.map_err(|e| unavailable(e.to_string()))
            }
            FeedLocation::File(path) => {
                tracing::debug!(team = %self.team, path = %path.display(), "Reading calendar file");
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| unavailable(format!("{}: {}", path.display(), e)))
            }
        }
    }

    /// Fetches and parses the feed into events, in feed order
    pub async fn events(&self, client: &reqwest::Client) -> Result<Vec<Event>> {
        let body = self.fetch(client).await?;
        let events = parse_ics(&body, self.tz)
            .map_err(|e| RosterError::source_unavailable(&self.team, e))?;
        tracing::info!(team = %self.team, events = events.len(), "Parsed calendar feed");
        Ok(events)
    }
}
