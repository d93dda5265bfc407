use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::error::{Result, RosterError};

/// Identifies one assignment within a team: the monitor of an event, or one
/// auxiliary role of it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssignmentKey {
    pub event_id: String,
    pub role: Option<String>,
}

impl AssignmentKey {
    pub fn monitor(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            role: None,
        }
    }

    pub fn role(event_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            role: Some(role.into()),
        }
    }
}

impl fmt::Display for AssignmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.role {
            Some(role) => write!(f, "{} [{}]", self.event_id, role),
            None => write!(f, "{}", self.event_id),
        }
    }
}

/// An assignment reported by an external, human-editable copy of the roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRow {
    pub key: AssignmentKey,
    pub assignee: String,
}

/// The two CSV tables backing the ledger
#[derive(Debug, Clone)]
pub struct LedgerStore {
    pub counts_path: PathBuf,
    pub records_path: PathBuf,
}

impl LedgerStore {
    pub fn new(counts_path: impl Into<PathBuf>, records_path: impl Into<PathBuf>) -> Self {
        Self {
            counts_path: counts_path.into(),
            records_path: records_path.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.counts_path, &config.records_path)
    }

    fn exists(&self) -> bool {
        self.counts_path.exists() || self.records_path.exists()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CountRow {
    #[serde(rename = "Team")]
    team: String,
    #[serde(rename = "Family")]
    family: String,
    #[serde(rename = "Count")]
    count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordRow {
    #[serde(rename = "Team")]
    team: String,
    #[serde(rename = "EventID")]
    event_id: String,
    #[serde(rename = "Role")]
    role: Option<String>,
    #[serde(rename = "Assignee")]
    assignee: String,
}

/// What `Ledger::load` found
#[derive(Debug, Default)]
pub struct LoadReport {
    pub records: usize,
    /// Store was unreadable and has been ignored
    pub warning: Option<RosterError>,
    /// Teams whose stored counts disagreed with their records and were rebuilt
    pub rebuilt_teams: Vec<String>,
}

/// Durable record of who was assigned to what, plus running counts per name.
///
/// Both maps are keyed by team first; teams never see each other's entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: BTreeMap<String, BTreeMap<AssignmentKey, String>>,
    counts: BTreeMap<String, BTreeMap<String, u32>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the ledger. A missing store gives an empty ledger; an unreadable
    /// one gives an empty ledger plus a warning in the report.
    pub fn load(store: &LedgerStore) -> (Self, LoadReport) {
        if !store.exists() {
            tracing::info!("No ledger store found, starting empty");
            return (Self::new(), LoadReport::default());
        }

        match Self::read(store) {
            Ok((ledger, rebuilt_teams)) => {
                let records: usize = ledger.records.values().map(BTreeMap::len).sum();
                tracing::info!(records, teams = ledger.records.len(), "Loaded ledger");
                (
                    ledger,
                    LoadReport {
                        records,
                        warning: None,
                        rebuilt_teams,
                    },
                )
            }
            Err(err) => {
                tracing::warn!(error = %err, "Ledger store unreadable, starting empty");
                (
                    Self::new(),
                    LoadReport {
                        records: 0,
                        warning: Some(err),
                        rebuilt_teams: Vec::new(),
                    },
                )
            }
        }
    }

    fn read(store: &LedgerStore) -> Result<(Self, Vec<String>)> {
        let corrupt = |path: &Path, err: csv::Error| RosterError::StorageCorrupt {
            path: path.to_path_buf(),
            reason: err.to_string(),
        };

        let mut ledger = Self::new();

        if store.records_path.exists() {
            let mut reader =
                csv::Reader::from_path(&store.records_path).map_err(|e| corrupt(&store.records_path, e))?;
            for row in reader.deserialize::<RecordRow>() {
                let row = row.map_err(|e| corrupt(&store.records_path, e))?;
                let key = AssignmentKey {
                    event_id: row.event_id,
                    role: row.role.filter(|r| !r.trim().is_empty()),
                };
                ledger
                    .records
                    .entry(row.team)
                    .or_default()
                    .insert(key, row.assignee);
            }
        }

        if store.counts_path.exists() {
            let mut reader =
                csv::Reader::from_path(&store.counts_path).map_err(|e| corrupt(&store.counts_path, e))?;
            for row in reader.deserialize::<CountRow>() {
                let row = row.map_err(|e| corrupt(&store.counts_path, e))?;
                ledger
                    .counts
                    .entry(row.team)
                    .or_default()
                    .insert(row.family, row.count);
            }
        }

        let rebuilt = ledger.rebuild_inconsistent_counts();
        Ok((ledger, rebuilt))
    }

    /// Replaces any team's stored counts that do not match its records with
    /// a fresh tally. Zero entries for known names are kept.
    fn rebuild_inconsistent_counts(&mut self) -> Vec<String> {
        let mut teams: Vec<String> = self.records.keys().cloned().collect();
        teams.extend(self.counts.keys().cloned());
        teams.sort();
        teams.dedup();

        let mut rebuilt = Vec::new();
        for team in teams {
            let mut tally: BTreeMap<String, u32> = BTreeMap::new();
            if let Some(records) = self.records.get(&team) {
                for name in records.values() {
                    *tally.entry(name.clone()).or_insert(0) += 1;
                }
            }

            let stored = self.counts.entry(team.clone()).or_default();
            let consistent = stored
                .iter()
                .all(|(name, count)| tally.get(name).copied().unwrap_or(0) == *count)
                && tally.iter().all(|(name, count)| stored.get(name) == Some(count));

            if !consistent {
                tracing::warn!(team = %team, "Stored counts disagree with records, rebuilding");
                for count in stored.values_mut() {
                    *count = 0;
                }
                stored.extend(tally);
                rebuilt.push(team);
            }
        }
        rebuilt
    }

    /// Makes every pool member visible in the counts, starting at zero
    pub fn ensure_pool(&mut self, team: &str, pool: &[String]) {
        let counts = self.counts.entry(team.to_string()).or_default();
        for name in pool {
            counts.entry(name.clone()).or_insert(0);
        }
    }

    /// Merges rows from the external roster; the external value wins.
    /// Returns how many records changed.
    pub fn reconcile(&mut self, team: &str, rows: &[ExternalRow]) -> usize {
        let mut changed = 0;
        for row in rows {
            let assignee = row.assignee.trim();
            if assignee.is_empty() {
                continue;
            }

            let records = self.records.entry(team.to_string()).or_default();
            let previous = records.insert(row.key.clone(), assignee.to_string());
            if previous.as_deref() == Some(assignee) {
                continue;
            }

            let counts = self.counts.entry(team.to_string()).or_default();
            if let Some(old) = &previous {
                if let Some(count) = counts.get_mut(old) {
                    *count = count.saturating_sub(1);
                }
            }
            *counts.entry(assignee.to_string()).or_insert(0) += 1;

            tracing::info!(
                team,
                key = %row.key,
                previous = ?previous,
                assignee,
                "Reconciled external edit"
            );
            changed += 1;
        }
        changed
    }

    /// Existing assignee, or `None` when unassigned
    pub fn get(&self, team: &str, key: &AssignmentKey) -> Option<&str> {
        self.records
            .get(team)
            .and_then(|records| records.get(key))
            .map(String::as_str)
    }

    /// Creates a record and bumps the assignee's count. Fails if the key is
    /// already assigned; callers check with `get` first.
    pub fn record_new(&mut self, team: &str, key: AssignmentKey, name: &str) -> Result<()> {
        let records = self.records.entry(team.to_string()).or_default();
        if records.contains_key(&key) {
            return Err(RosterError::DuplicateAssignment {
                team: team.to_string(),
                key: key.to_string(),
            });
        }
        records.insert(key, name.to_string());
        *self
            .counts
            .entry(team.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    /// Counts for one team (empty when the team is unknown)
    pub fn counts(&self, team: &str) -> BTreeMap<String, u32> {
        self.counts.get(team).cloned().unwrap_or_default()
    }

    pub fn count(&self, team: &str, name: &str) -> u32 {
        self.counts
            .get(team)
            .and_then(|counts| counts.get(name))
            .copied()
            .unwrap_or(0)
    }

    pub fn record_count(&self, team: &str) -> usize {
        self.records.get(team).map(BTreeMap::len).unwrap_or(0)
    }

    /// Writes a full snapshot of both tables. Each file is written beside its
    /// target and renamed into place.
    pub fn save(&self, store: &LedgerStore) -> Result<()> {
        write_atomically(&store.counts_path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            for (team, counts) in &self.counts {
                for (family, count) in counts {
                    writer.serialize(CountRow {
                        team: team.clone(),
                        family: family.clone(),
                        count: *count,
                    })?;
                }
            }
            writer.flush()?;
            Ok(())
        })?;

        write_atomically(&store.records_path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            for (team, records) in &self.records {
                for (key, assignee) in records {
                    writer.serialize(RecordRow {
                        team: team.clone(),
                        event_id: key.event_id.clone(),
                        role: key.role.clone(),
                        assignee: assignee.clone(),
                    })?;
                }
            }
            writer.flush()?;
            Ok(())
        })?;

        tracing::debug!(
            counts = %store.counts_path.display(),
            records = %store.records_path.display(),
            "Saved ledger"
        );
        Ok(())
    }
}

fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp_path)?;
    write(&mut file)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)?;
    Ok(())
}
