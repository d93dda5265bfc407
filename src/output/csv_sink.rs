use csv::{ReaderBuilder, WriterBuilder};
use std::fs;
use std::path::Path;

use crate::error::{Result, RosterError};
use crate::roster::{RowKey, TeamRoster};

pub const EVENT_COLUMN: &str = "Event";
pub const LOCATION_COLUMN: &str = "Location";
pub const DATE_COLUMN: &str = "Date";
pub const TIME_COLUMN: &str = "Time";
pub const DURATION_COLUMN: &str = "Duration (minutes)";
pub const MONITOR_COLUMN: &str = "Locker Room Monitor";

/// A line read back from a (possibly hand-edited) roster file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub key: RowKey,
    pub monitor: String,
    /// (role, assignee) for every role column
    pub roles: Vec<(String, String)>,
}

/// Writes a team's sorted roster, one line per decision
pub fn write_roster(path: &Path, roster: &TeamRoster) -> Result<()> {
    let sink_err = |reason: String| RosterError::sink_unavailable(&roster.team, path, reason);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| sink_err(e.to_string()))?;
        }
    }

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| sink_err(e.to_string()))?;

    let role_names = roster.role_names();
    let mut header = vec![
        EVENT_COLUMN.to_string(),
        LOCATION_COLUMN.to_string(),
        DATE_COLUMN.to_string(),
        TIME_COLUMN.to_string(),
        DURATION_COLUMN.to_string(),
        MONITOR_COLUMN.to_string(),
    ];
    header.extend(role_names.iter().cloned());
    writer
        .write_record(&header)
        .map_err(|e| sink_err(e.to_string()))?;

    for decision in &roster.decisions {
        let mut record = vec![
            decision.event.clone(),
            decision.location.clone(),
            decision.date.clone(),
            decision.time.clone(),
            decision.duration_minutes.to_string(),
            decision.monitor.clone().unwrap_or_default(),
        ];
        for role in &role_names {
            record.push(decision.role(role).unwrap_or("").to_string());
        }
        writer
            .write_record(&record)
            .map_err(|e| sink_err(e.to_string()))?;
    }

    writer.flush().map_err(|e| sink_err(e.to_string()))?;
    tracing::debug!(team = %roster.team, path = %path.display(), rows = roster.decisions.len(), "Wrote roster");
    Ok(())
}

/// Reads a roster file back. A missing file has no rows. Every column after
/// the monitor column is treated as a role column.
pub fn read_roster(team: &str, path: &Path) -> Result<Vec<SheetRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let sink_err = |reason: String| RosterError::sink_unavailable(team, path, reason);

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| sink_err(e.to_string()))?;
    let headers = reader.headers().map_err(|e| sink_err(e.to_string()))?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| sink_err(format!("missing '{}' column", name)))
    };
    let event_col = column(EVENT_COLUMN)?;
    let location_col = column(LOCATION_COLUMN)?;
    let date_col = column(DATE_COLUMN)?;
    let time_col = column(TIME_COLUMN)?;
    let monitor_col = column(MONITOR_COLUMN)?;

    let role_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .skip(monitor_col + 1)
        .filter(|(_, h)| !h.trim().is_empty())
        .map(|(i, h)| (i, h.trim().to_string()))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| sink_err(e.to_string()))?;
        let field = |i: usize| record.get(i).unwrap_or("").trim().to_string();

        let key = RowKey {
            event: field(event_col),
            location: field(location_col),
            date: field(date_col),
            time: field(time_col),
        };
        if key.event.is_empty() && key.date.is_empty() {
            continue;
        }
        rows.push(SheetRow {
            key,
            monitor: field(monitor_col),
            roles: role_cols
                .iter()
                .map(|(i, role)| (role.clone(), field(*i)))
                .collect(),
        });
    }
    Ok(rows)
}
