use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An auxiliary role filled for a home game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: String,
    pub name: String,
}

/// One roster line: an accepted event and who covers it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub event_id: String,
    pub event: String,
    pub location: String,
    /// ISO date in the display timezone
    pub date: String,
    /// 24-hour `HH:MM` in the display timezone
    pub time: String,
    pub duration_minutes: i64,
    pub monitor: Option<String>,
    pub roles: Vec<RoleAssignment>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Decision {
    pub fn row_key(&self) -> RowKey {
        RowKey {
            event: self.event.clone(),
            location: self.location.clone(),
            date: self.date.clone(),
            time: self.time.clone(),
        }
    }

    pub fn role(&self, role: &str) -> Option<&str> {
        self.roles
            .iter()
            .find(|r| r.role == role)
            .map(|r| r.name.as_str())
    }
}

/// How a roster line is identified once it has left the engine: the visible
/// columns, since exported rosters carry no event ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub event: String,
    pub location: String,
    pub date: String,
    pub time: String,
}

/// The sorted result of one team's run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRoster {
    pub team: String,
    pub decisions: Vec<Decision>,
    /// Assignments created during this run
    pub new_assignments: usize,
    /// Events dropped by the filter
    pub skipped: usize,
}

impl TeamRoster {
    /// Role column names present in any decision, in first-seen order
    pub fn role_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for decision in &self.decisions {
            for role in &decision.roles {
                if !names.contains(&role.role) {
                    names.push(role.role.clone());
                }
            }
        }
        names
    }

    pub fn monitored(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(|d| d.monitor.is_some())
    }
}
