//! Configuration for roster runs
//!
//! Loaded from a TOML file. Every section has defaults so a file only needs
//! to list its teams; the defaults mirror the rink lists the association has
//! been using.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Result, RosterError};

/// Upper bound for export lead/trail padding (one day)
pub const MAX_PADDING_MINUTES: i64 = 24 * 60;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// IANA timezone used for display and for floating feed times
    pub timezone: String,

    /// Skip events that already started
    pub future_only: bool,

    /// Directory receiving roster CSV and ICS files
    pub output_dir: PathBuf,

    pub storage: StorageConfig,
    pub filter: FilterConfig,
    pub roles: RolesConfig,
    pub export: ExportConfig,
    pub teams: Vec<TeamConfig>,
}

/// Where the ledger lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub counts_path: PathBuf,
    pub records_path: PathBuf,
}

/// Event eligibility rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Case-insensitive substrings rejecting an event when found in its
    /// name, description or location
    pub exclusion_terms: Vec<String>,

    /// Locations that never describe a real venue (matched case-insensitively
    /// as whole words or phrases of the event location)
    pub meta_locations: Vec<String>,

    /// Venues that need a locker room monitor (exact, case-insensitive)
    pub monitor_locations: Vec<String>,
}

/// Auxiliary roles handed out for home games
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    /// Substring of the event name marking a game
    pub game_marker: String,

    /// Role names, in assignment order
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStyle {
    AllDay,
    Timed,
}

/// Personal calendar export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub style: ExportStyle,

    /// Minutes before the event the locker room must be monitored
    pub lead_minutes: i64,

    /// Minutes after the event before the locker room is closed
    pub trail_minutes: i64,
}

/// One team's fixed configuration record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,

    /// Family pool, in the order the team manager listed it
    pub families: Vec<String>,

    /// Calendar feed: an http(s) URL or a local .ics path
    pub feed: String,

    /// Substring identifying the team's home rink
    #[serde(default)]
    pub home_location: Option<String>,

    /// Roster CSV file name inside `output_dir`
    #[serde(default)]
    pub output: Option<String>,

    /// Read the previous roster CSV back before overwriting it
    #[serde(default = "default_true")]
    pub reconcile: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            timezone: "America/Chicago".to_string(),
            future_only: false,
            output_dir: PathBuf::from("."),
            storage: StorageConfig::default(),
            filter: FilterConfig::default(),
            roles: RolesConfig::default(),
            export: ExportConfig::default(),
            teams: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            counts_path: PathBuf::from("assignment_counts.csv"),
            records_path: PathBuf::from("assigned_events.csv"),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            exclusion_terms: strings(&[
                "Skills Off Ice",
                "Dryland",
                "Goalie Training",
                "Off Ice",
                "Conditioning",
                "Meeting",
                "Tournament",
                "LRM",
            ]),
            meta_locations: strings(&[
                "New Hope Ice Arena, Louisiana Avenue North, New Hope, MN, USA",
                "TBD",
                "TBA",
            ]),
            monitor_locations: strings(&[
                "New Hope North",
                "New Hope South",
                "Breck",
                "Orono Ice Arena (ag)",
                "Northeast (ag)",
                "SLP East (ag)",
                "MG West (ag)",
                "PIC A (ag)",
                "PIC C (ag)",
                "Hopkins Pavilion (ag)",
                "Thaler (ag)",
                "SLP West (ag)",
                "Delano Arena",
            ]),
        }
    }
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            game_marker: "Game".to_string(),
            names: vec![
                "Scorekeeper".to_string(),
                "Timekeeper".to_string(),
                "Penalty Box".to_string(),
            ],
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            style: ExportStyle::AllDay,
            lead_minutes: 30,
            trail_minutes: 15,
        }
    }
}

impl RosterConfig {
    /// Loads and validates a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RosterError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Parses and validates configuration text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| RosterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tz()?;

        let mut seen = HashSet::new();
        let mut outputs = HashSet::new();
        for team in &self.teams {
            if team.name.trim().is_empty() {
                return Err(RosterError::Config("team name must not be empty".to_string()));
            }
            // selection and output file names ignore case
            if !seen.insert(team.slug()) {
                return Err(RosterError::Config(format!("duplicate team '{}'", team.name)));
            }
            if !outputs.insert(team.roster_file_name().to_lowercase()) {
                return Err(RosterError::Config(format!(
                    "team '{}' shares its roster file with another team",
                    team.name
                )));
            }
            if team.families.iter().all(|f| f.trim().is_empty()) {
                return Err(RosterError::Config(format!(
                    "team '{}' has an empty family pool",
                    team.name
                )));
            }
            if team.feed.trim().is_empty() {
                return Err(RosterError::Config(format!(
                    "team '{}' has no calendar feed",
                    team.name
                )));
            }
        }

        for minutes in [self.export.lead_minutes, self.export.trail_minutes] {
            if !(0..=MAX_PADDING_MINUTES).contains(&minutes) {
                return Err(RosterError::Config(format!(
                    "export lead/trail minutes must be between 0 and {}",
                    MAX_PADDING_MINUTES
                )));
            }
        }

        Ok(())
    }

    /// Display timezone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| RosterError::Config(format!("invalid timezone '{}'", self.timezone)))
    }

    /// Finds a team by name (case-insensitive)
    pub fn team(&self, name: &str) -> Option<&TeamConfig> {
        self.teams.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }
}

impl TeamConfig {
    /// File-name friendly team name
    pub fn slug(&self) -> String {
        self.name.trim().to_lowercase().replace(' ', "_")
    }

    pub fn roster_file_name(&self) -> String {
        self.output
            .clone()
            .unwrap_or_else(|| format!("locker_room_monitors_{}.csv", self.slug()))
    }

    pub fn calendar_file_name(&self) -> String {
        format!("locker_room_monitor_{}.ics", self.slug())
    }

    /// Pool with blank entries dropped
    pub fn pool(&self) -> Vec<String> {
        self.families
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect()
    }
}
