//! Orchard TEAM timesheet library
//!
//! This library keeps a small crew's shared hours board in sync with a
//! realtime store, derives weekly totals and pay figures from free-form cell
//! text, emails pay summaries and exports the report as a PDF.

pub mod config;
pub mod engine;
pub mod errors;
pub mod helpers;
pub mod models;
pub mod service;

pub use config::TimesheetConfig;
pub use errors::{TimesheetError, TimesheetResult};
pub use service::TimesheetService;

// Re-export key types for convenience
pub use engine::{MemberTotals, PaySummary, TimesheetEngine, parse_hours};
pub use models::hours::{CellChoice, HoursGrid, Marker, SetAllRequest};
