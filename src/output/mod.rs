//! Everything the roster is rendered into: the shared roster CSV, personal
//! calendar files, and console output.

pub mod csv_sink;
pub mod display;
pub mod ics_export;

pub use csv_sink::{read_roster, write_roster, SheetRow};
pub use ics_export::{render_calendar, write_calendar};
