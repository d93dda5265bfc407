//! Batch driver: one team at a time, fetch → reconcile → assign → write → save
//!
//! Failures are scoped to the team that raised them. A feed that cannot be
//! fetched leaves the ledger untouched; a roster file that cannot be written
//! is reported but the ledger is still saved, so fairness state is never lost
//! because rendering failed.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::config::{RolesConfig, RosterConfig, TeamConfig};
use crate::error::{Result, RosterError};
use crate::event::Event;
use crate::output::csv_sink::{read_roster, write_roster, SheetRow};
use crate::output::ics_export::write_calendar;
use crate::roster::{
    is_home_game, row_key, Allocator, AssignmentKey, EventFilter, ExternalRow, Ledger, LedgerStore,
    RosterEngine, RowKey, TeamRoster, Verdict,
};
use crate::source::{http_client, CalendarSource};

/// Where a team's run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamRunState {
    Idle,
    Fetching,
    Assigning,
    Sorting,
    Done,
}

impl fmt::Display for TeamRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Assigning => "assigning",
            Self::Sorting => "sorting",
            Self::Done => "done",
        };
        write!(f, "{}", label)
    }
}

/// A team that completed its run (possibly with sink failures)
#[derive(Debug)]
pub struct TeamReport {
    pub roster: TeamRoster,
    /// Records changed by reading the previous roster back
    pub reconciled: usize,
    pub roster_path: PathBuf,
    pub calendar_path: PathBuf,
    pub sink_errors: Vec<RosterError>,
}

#[derive(Debug)]
pub struct TeamOutcome {
    pub team: String,
    pub result: std::result::Result<TeamReport, RosterError>,
}

impl TeamOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunSummary {
    pub outcomes: Vec<TeamOutcome>,
    /// Set when the ledger store was unreadable and the run started empty
    pub ledger_warning: Option<RosterError>,
    pub ledger: Ledger,
}

#[derive(Serialize)]
struct TeamSummaryJson<'a> {
    team: &'a str,
    status: &'static str,
    decisions: usize,
    new_assignments: usize,
    reconciled: usize,
    errors: Vec<String>,
    error_kinds: Vec<&'static str>,
    counts: std::collections::BTreeMap<String, u32>,
}

impl RunSummary {
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| !o.is_success())
    }

    pub fn to_json(&self) -> serde_json::Value {
        let teams: Vec<TeamSummaryJson<'_>> = self
            .outcomes
            .iter()
            .map(|outcome| {
                let counts = self.ledger.counts(&outcome.team);
                match &outcome.result {
                    Ok(report) => TeamSummaryJson {
                        team: &outcome.team,
                        status: if report.sink_errors.is_empty() { "ok" } else { "partial" },
                        decisions: report.roster.decisions.len(),
                        new_assignments: report.roster.new_assignments,
                        reconciled: report.reconciled,
                        errors: report.sink_errors.iter().map(ToString::to_string).collect(),
                        error_kinds: report.sink_errors.iter().map(RosterError::kind).collect(),
                        counts,
                    },
                    Err(err) => TeamSummaryJson {
                        team: &outcome.team,
                        status: "failed",
                        decisions: 0,
                        new_assignments: 0,
                        reconciled: 0,
                        errors: vec![err.to_string()],
                        error_kinds: vec![err.kind()],
                        counts,
                    },
                }
            })
            .collect();

        serde_json::json!({
            "ledger_warning": self.ledger_warning.as_ref().map(ToString::to_string),
            "teams": teams,
        })
    }
}

/// Maps rows of a previously written roster onto ledger keys. Only rows that
/// match exactly one monitored event of the current feed are used, and role
/// cells only count for home games and configured role names.
pub fn external_rows(
    team: &TeamConfig,
    rows: &[SheetRow],
    events: &[Event],
    filter: &EventFilter,
    roles: &RolesConfig,
    tz: Tz,
    now: DateTime<Utc>,
) -> Vec<ExternalRow> {
    let mut index: HashMap<RowKey, Option<&Event>> = HashMap::new();
    for event in events {
        if !filter.classify(event, now).needs_monitor() {
            continue;
        }
        if let Some(key) = row_key(event, tz) {
            index
                .entry(key)
                .and_modify(|matched| *matched = None)
                .or_insert(Some(event));
        }
    }

    let mut external = Vec::new();
    for row in rows {
        match index.get(&row.key) {
            Some(Some(event)) => {
                let uid = event.uid.as_str();
                if !row.monitor.is_empty() {
                    external.push(ExternalRow {
                        key: AssignmentKey::monitor(uid),
                        assignee: row.monitor.clone(),
                    });
                }
                let home_game = is_home_game(event, team, roles);
                for (role, name) in &row.roles {
                    if name.is_empty() {
                        continue;
                    }
                    let configured = roles.names.iter().find(|r| r.eq_ignore_ascii_case(role));
                    match configured {
                        Some(role) if home_game => external.push(ExternalRow {
                            key: AssignmentKey::role(uid, role.as_str()),
                            assignee: name.clone(),
                        }),
                        _ => {
                            tracing::warn!(team = %team.name, event = %row.key.event, date = %row.key.date, role = %role, "Ignoring role cell outside a home game");
                        }
                    }
                }
            }
            Some(None) => {
                tracing::warn!(team = %team.name, event = %row.key.event, date = %row.key.date, "Roster row matches several events, ignoring");
            }
            None => {
                tracing::debug!(team = %team.name, event = %row.key.event, date = %row.key.date, "Roster row matches no monitored event");
            }
        }
    }
    external
}

/// Runs the selected teams (all when `selection` is empty) with a fresh
/// entropy-seeded allocator
pub async fn run_teams(
    config: &RosterConfig,
    selection: &[String],
    now: DateTime<Utc>,
) -> Result<RunSummary> {
    Runner::new(config)?.run(selection, now).await
}

/// Runs teams sequentially against one shared ledger
pub struct Runner<'a> {
    config: &'a RosterConfig,
    store: LedgerStore,
    filter: EventFilter,
    tz: Tz,
    client: reqwest::Client,
    allocator: Allocator<StdRng>,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a RosterConfig) -> Result<Self> {
        Ok(Self {
            store: LedgerStore::from_config(&config.storage),
            filter: EventFilter::new(&config.filter, config.future_only),
            tz: config.tz()?,
            client: http_client()?,
            allocator: Allocator::from_entropy(),
            config,
        })
    }

    /// Replaces the tie-break source
    pub fn with_allocator(mut self, allocator: Allocator<StdRng>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Teams named in `selection` (all teams when empty), in config order
    pub fn select(&self, selection: &[String]) -> Result<Vec<&'a TeamConfig>> {
        for name in selection {
            if self.config.team(name).is_none() {
                return Err(RosterError::Config(format!("no team found with the name '{}'", name)));
            }
        }
        Ok(self
            .config
            .teams
            .iter()
            .filter(|team| {
                selection.is_empty() || selection.iter().any(|s| s.eq_ignore_ascii_case(&team.name))
            })
            .collect())
    }

    pub fn ledger_store(&self) -> &LedgerStore {
        &self.store
    }

    /// Runs the selected teams
    pub async fn run(&mut self, selection: &[String], now: DateTime<Utc>) -> Result<RunSummary> {
        let teams = self.select(selection)?;
        let (mut ledger, report) = Ledger::load(&self.store);
        for team in &report.rebuilt_teams {
            tracing::warn!(team = %team, "Counts were rebuilt from assignment records");
        }

        let mut outcomes = Vec::with_capacity(teams.len());
        for team in teams {
            let result = self.run_team(team, &mut ledger, now).await;
            if let Err(err) = &result {
                tracing::error!(team = %team.name, error = %err, "Team run failed");
            }
            outcomes.push(TeamOutcome {
                team: team.name.clone(),
                result,
            });
        }

        Ok(RunSummary {
            outcomes,
            ledger_warning: report.warning,
            ledger,
        })
    }

    async fn run_team(
        &mut self,
        team: &TeamConfig,
        ledger: &mut Ledger,
        now: DateTime<Utc>,
    ) -> Result<TeamReport> {
        let mut state = TeamRunState::Idle;
        let mut advance = |next: TeamRunState| {
            tracing::debug!(team = %team.name, from = %state, to = %next, "Team run state");
            state = next;
        };

        advance(TeamRunState::Fetching);
        let source = CalendarSource::new(team, self.tz);
        let events = source.events(&self.client).await?;

        let roster_path = self.config.output_dir.join(team.roster_file_name());
        let calendar_path = self.config.output_dir.join(team.calendar_file_name());

        let mut reconciled = 0;
        if team.reconcile {
            match read_roster(&team.name, &roster_path) {
                Ok(rows) => {
                    let external = external_rows(
                        team,
                        &rows,
                        &events,
                        &self.filter,
                        &self.config.roles,
                        self.tz,
                        now,
                    );
                    reconciled = ledger.reconcile(&team.name, &external);
                    if reconciled > 0 {
                        tracing::info!(team = %team.name, reconciled, "Applied edits from previous roster");
                    }
                }
                Err(err) => {
                    tracing::warn!(team = %team.name, error = %err, "Could not read previous roster, skipping reconcile");
                }
            }
        }

        advance(TeamRunState::Assigning);
        let roster = {
            let mut engine = RosterEngine::new(
                team,
                &self.filter,
                &self.config.roles,
                self.tz,
                &mut self.allocator,
            );
            engine.run(ledger, &events, now)?
        };
        advance(TeamRunState::Sorting);

        let mut sink_errors = Vec::new();
        if let Err(err) = write_roster(&roster_path, &roster) {
            tracing::error!(team = %team.name, error = %err, "Roster write failed");
            sink_errors.push(err);
        }
        if let Err(err) = write_calendar(&calendar_path, &roster, &self.config.export, self.tz, now) {
            tracing::error!(team = %team.name, error = %err, "Calendar export failed");
            sink_errors.push(err);
        }

        ledger.save(&self.store)?;
        advance(TeamRunState::Done);

        tracing::info!(
            team = %team.name,
            decisions = roster.decisions.len(),
            new_assignments = roster.new_assignments,
            skipped = roster.skipped,
            "Team roster complete"
        );

        Ok(TeamReport {
            roster,
            reconciled,
            roster_path,
            calendar_path,
            sink_errors,
        })
    }

    /// Fetches a team's feed and classifies every event without touching the
    /// ledger
    pub async fn check(&self, team: &TeamConfig, now: DateTime<Utc>) -> Result<Vec<(Event, Verdict)>> {
        let source = CalendarSource::new(team, self.tz);
        let events = source.events(&self.client).await?;
        Ok(events
            .into_iter()
            .map(|event| {
                let verdict = self.filter.classify(&event, now);
                (event, verdict)
            })
            .collect())
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }
}
