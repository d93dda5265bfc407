use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::Rng;

use super::allocator::Allocator;
use super::filter::EventFilter;
use super::ledger::{AssignmentKey, Ledger};
use super::types::{Decision, RoleAssignment, RowKey, TeamRoster};
use crate::config::{RolesConfig, TeamConfig};
use crate::error::Result;
use crate::event::Event;

/// ISO date and 24-hour time of an instant in the display timezone
pub fn local_date_time(instant: DateTime<Utc>, tz: Tz) -> (String, String) {
    let local = instant.with_timezone(&tz);
    (
        local.format("%Y-%m-%d").to_string(),
        local.format("%H:%M").to_string(),
    )
}

/// The visible key a roster line for `event` will carry, if it has a start
pub fn row_key(event: &Event, tz: Tz) -> Option<RowKey> {
    let (date, time) = local_date_time(event.start?, tz);
    Some(RowKey {
        event: event.summary.trim().to_string(),
        location: event.location_str().to_string(),
        date,
        time,
    })
}

/// A game (by name) at the team's home rink (by location). Teams without a
/// home rink, or runs without role names, have no home games.
pub fn is_home_game(event: &Event, team: &TeamConfig, roles: &RolesConfig) -> bool {
    let Some(home) = team.home_location.as_deref() else {
        return false;
    };
    let marker = roles.game_marker.trim().to_lowercase();
    let home = home.trim().to_lowercase();
    if marker.is_empty() || home.is_empty() || roles.names.is_empty() {
        return false;
    }
    event.summary.to_lowercase().contains(&marker)
        && event.location_str().to_lowercase().contains(&home)
}

/// Drives one team through one run: filter each event, resolve or allocate
/// its monitor (and home-game roles), then sort the roster.
pub struct RosterEngine<'a, R: Rng> {
    team: &'a TeamConfig,
    filter: &'a EventFilter,
    roles: &'a RolesConfig,
    tz: Tz,
    allocator: &'a mut Allocator<R>,
    pool: Vec<String>,
    last_assigned: Option<String>,
    new_assignments: usize,
}

impl<'a, R: Rng> RosterEngine<'a, R> {
    pub fn new(
        team: &'a TeamConfig,
        filter: &'a EventFilter,
        roles: &'a RolesConfig,
        tz: Tz,
        allocator: &'a mut Allocator<R>,
    ) -> Self {
        Self {
            pool: team.pool(),
            team,
            filter,
            roles,
            tz,
            allocator,
            last_assigned: None,
            new_assignments: 0,
        }
    }

    /// Builds the team's roster. The ledger is updated as each event is
    /// assigned, so later events see the new counts.
    pub fn run(
        &mut self,
        ledger: &mut Ledger,
        events: &[Event],
        now: DateTime<Utc>,
    ) -> Result<TeamRoster> {
        self.last_assigned = None;
        self.new_assignments = 0;
        ledger.ensure_pool(&self.team.name, &self.pool);

        let mut decisions = Vec::new();
        let mut skipped = 0;

        for event in events {
            let verdict = self.filter.classify(event, now);
            if !verdict.is_eligible() {
                tracing::debug!(team = %self.team.name, uid = %event.uid, verdict = ?verdict, "Skipping event");
                skipped += 1;
                continue;
            }
            // eligible events always carry both times
            let (Some(start), Some(end)) = (event.start, event.end) else {
                skipped += 1;
                continue;
            };

            let (monitor, roles) = if verdict.needs_monitor() {
                let monitor = self.resolve_monitor(ledger, &event.uid)?;
                let roles = if is_home_game(event, self.team, self.roles) {
                    self.resolve_roles(ledger, &event.uid)?
                } else {
                    Vec::new()
                };
                (monitor, roles)
            } else {
                (None, Vec::new())
            };

            let (date, time) = local_date_time(start, self.tz);
            let decision = Decision {
                event_id: event.uid.clone(),
                event: event.summary.trim().to_string(),
                location: event.location_str().to_string(),
                date,
                time,
                duration_minutes: (end - start).num_minutes(),
                monitor,
                roles,
                start,
                end,
            };
            tracing::debug!(
                team = %self.team.name,
                uid = %decision.event_id,
                date = %decision.date,
                monitor = ?decision.monitor,
                "Roster line"
            );
            decisions.push(decision);
        }

        decisions.sort_by(|a, b| (&a.date, &a.time).cmp(&(&b.date, &b.time)));

        Ok(TeamRoster {
            team: self.team.name.clone(),
            decisions,
            new_assignments: self.new_assignments,
            skipped,
        })
    }

    fn resolve_monitor(&mut self, ledger: &mut Ledger, uid: &str) -> Result<Option<String>> {
        let key = AssignmentKey::monitor(uid);
        if let Some(existing) = ledger.get(&self.team.name, &key) {
            let existing = existing.to_string();
            self.last_assigned = Some(existing.clone());
            return Ok(Some(existing));
        }

        let counts = ledger.counts(&self.team.name);
        let picked = self.allocator.choose(
            &self.team.name,
            &self.pool,
            &counts,
            &mut self.last_assigned,
            1,
        );
        let Some(name) = picked.into_iter().next() else {
            return Ok(None);
        };
        ledger.record_new(&self.team.name, key, &name)?;
        self.new_assignments += 1;
        tracing::info!(team = %self.team.name, uid, monitor = %name, "Assigned monitor");
        Ok(Some(name))
    }

    fn resolve_roles(&mut self, ledger: &mut Ledger, uid: &str) -> Result<Vec<RoleAssignment>> {
        let mut filled: Vec<Option<String>> = self
            .roles
            .names
            .iter()
            .map(|role| {
                ledger
                    .get(&self.team.name, &AssignmentKey::role(uid, role.as_str()))
                    .map(str::to_string)
            })
            .collect();

        let missing = filled.iter().filter(|f| f.is_none()).count();
        if missing > 0 {
            let counts = ledger.counts(&self.team.name);
            let mut picks = self
                .allocator
                .choose(
                    &self.team.name,
                    &self.pool,
                    &counts,
                    &mut self.last_assigned,
                    missing,
                )
                .into_iter();

            for (role, slot) in self.roles.names.iter().zip(filled.iter_mut()) {
                if slot.is_some() {
                    continue;
                }
                let Some(name) = picks.next() else {
                    break;
                };
                ledger.record_new(&self.team.name, AssignmentKey::role(uid, role.as_str()), &name)?;
                self.new_assignments += 1;
                tracing::info!(team = %self.team.name, uid, role = %role, name = %name, "Assigned role");
                *slot = Some(name);
            }
        }

        Ok(self
            .roles
            .names
            .iter()
            .zip(filled)
            .filter_map(|(role, name)| {
                name.map(|name| RoleAssignment {
                    role: role.clone(),
                    name,
                })
            })
            .collect())
    }
}
