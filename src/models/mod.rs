pub mod calendar;
pub mod hours;
pub mod location;
pub mod report;
pub mod snapshot;
