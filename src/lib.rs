//! Locker room monitor rosters for youth hockey teams.
//!
//! Each team's calendar feed is filtered down to the events that need a
//! parent volunteer, and volunteers are drawn from the team's family pool so
//! that assignments stay as even as possible across the season. Past
//! assignments live in a small CSV ledger and are never reshuffled.

pub mod config;
pub mod error;
pub mod event;
pub mod output;
pub mod roster;
pub mod runner;
pub mod source;

pub use config::{RosterConfig, TeamConfig};
pub use error::{Result, RosterError};
pub use event::Event;
pub use runner::{run_teams, RunSummary, Runner, TeamOutcome, TeamReport};
