pub mod allocator;
pub mod engine;
pub mod filter;
pub mod ledger;
pub mod types;

pub use allocator::Allocator;
pub use engine::{is_home_game, local_date_time, row_key, RosterEngine};
pub use filter::{EventFilter, RejectReason, Verdict};
pub use ledger::{AssignmentKey, ExternalRow, Ledger, LedgerStore, LoadReport};
pub use types::{Decision, RoleAssignment, RowKey, TeamRoster};
