//! Error types shared by the roster library

use std::path::PathBuf;
use thiserror::Error;

/// Result type for roster operations
pub type Result<T> = std::result::Result<T, RosterError>;

/// Errors raised while building a team's roster.
///
/// Every variant except `Config` is scoped to a single team: the runner
/// records it against that team and moves on to the next one.
#[derive(Debug, Error)]
pub enum RosterError {
    /// The calendar feed could not be fetched or parsed
    #[error("calendar source unavailable for team '{team}': {reason}")]
    SourceUnavailable { team: String, reason: String },

    /// The ledger store exists but could not be read
    #[error("ledger store '{}' is corrupt: {reason}", path.display())]
    StorageCorrupt { path: PathBuf, reason: String },

    /// An output file could not be written
    #[error("output sink '{}' unavailable for team '{team}': {reason}", path.display())]
    SinkUnavailable {
        team: String,
        path: PathBuf,
        reason: String,
    },

    /// A record already exists for this key
    #[error("team '{team}' already has an assignment for '{key}'")]
    DuplicateAssignment { team: String, key: String },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl RosterError {
    pub fn source_unavailable(team: &str, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            team: team.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn sink_unavailable(team: &str, path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SinkUnavailable {
            team: team.to_string(),
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Short label used in run summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source",
            Self::StorageCorrupt { .. } => "storage",
            Self::SinkUnavailable { .. } => "sink",
            Self::DuplicateAssignment { .. } => "ledger",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Csv(_) => "csv",
        }
    }
}
