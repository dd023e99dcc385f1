//! Hours parsing, aggregation and pay derivation.
//!
//! Everything here is pure: it reads a grid snapshot and the configuration
//! and returns figures. Nothing is cached; totals are recomputed on every
//! call.

pub mod parser;
pub mod pay;
pub mod totals;

use std::sync::Arc;

use crate::config::TimesheetConfig;
use crate::models::{
    calendar::Week,
    hours::{ConfirmedSetAll, HoursGrid},
};

pub use parser::parse_hours;
pub use pay::{PaySummary, format_money};
pub use totals::{MemberTotals, format_hours};

#[derive(Clone, Debug)]
pub struct TimesheetEngine {
    config: Arc<TimesheetConfig>,
}

impl TimesheetEngine {
    pub fn new(config: Arc<TimesheetConfig>) -> Self {
        TimesheetEngine { config }
    }

    pub fn config(&self) -> &TimesheetConfig {
        &self.config
    }

    pub fn weekly_total(&self, grid: &HoursGrid, member: &str, week: &Week) -> String {
        totals::weekly_total(grid, member, &week.days)
    }

    pub fn grand_total_hours(&self, grid: &HoursGrid, member: &str) -> f64 {
        totals::grand_total_hours(
            grid,
            member,
            &self.config.calendar,
            self.config.grand_total_scope,
        )
    }

    pub fn grand_total(&self, grid: &HoursGrid, member: &str) -> String {
        format_hours(self.grand_total_hours(grid, member))
    }

    pub fn member_total(&self, grid: &HoursGrid, member: &str) -> MemberTotals {
        totals::member_totals(
            grid,
            member,
            &self.config.calendar,
            self.config.grand_total_scope,
        )
    }

    pub fn member_totals(&self, grid: &HoursGrid) -> Vec<MemberTotals> {
        self.config
            .roster
            .iter()
            .map(|member| self.member_total(grid, member))
            .collect()
    }

    /// Pay for `member`, computed from the grand total as displayed so the
    /// figures agree with the hours printed next to them.
    pub fn pay_summary(&self, grid: &HoursGrid, member: &str) -> PaySummary {
        let displayed = self.grand_total(grid, member);
        let hours = displayed.parse::<f64>().unwrap_or(0.0);
        PaySummary::derive(member, hours, &self.config.rates)
    }

    /// Returns a copy of `grid` with the confirmed value written for every
    /// roster member on the requested day. Other days and members outside
    /// the roster are left alone.
    pub fn apply_set_all(&self, grid: &HoursGrid, confirmed: &ConfirmedSetAll) -> HoursGrid {
        let request = confirmed.request();
        let value = request.choice.cell_value();

        let mut updated = grid.clone();
        for member in &self.config.roster {
            updated.set(member, &request.day, value.clone());
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PayRates;
    use crate::models::{
        calendar::Calendar,
        hours::{CellChoice, Marker, SetAllRequest},
    };
    use chrono::NaiveDate;

    fn engine() -> TimesheetEngine {
        let start = NaiveDate::from_ymd_opt(2026, 1, 19).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        let config = TimesheetConfig::new(
            vec!["A".to_string(), "B".to_string()],
            Calendar::new(start, end).unwrap(),
            PayRates::default(),
        );
        TimesheetEngine::new(Arc::new(config))
    }

    #[test]
    fn set_all_writes_the_literal_for_every_member() {
        let engine = engine();
        let mut grid = HoursGrid::default();
        grid.set("A", "20 ene", "8".to_string());

        let confirmed =
            SetAllRequest::new("19 ene", CellChoice::Hours("4.5".to_string())).confirm();
        let updated = engine.apply_set_all(&grid, &confirmed);

        assert_eq!(updated.cell("A", "19 ene"), Some("4.5"));
        assert_eq!(updated.cell("B", "19 ene"), Some("4.5"));
        assert_eq!(updated.cell("A", "20 ene"), Some("8"));
        assert_eq!(updated.cell("B", "20 ene"), None);
        assert_eq!(grid.cell("A", "19 ene"), None);
    }

    #[test]
    fn set_all_clear_keeps_keys_with_empty_values() {
        let engine = engine();
        let mut grid = HoursGrid::default();
        grid.set("A", "19 ene", "8".to_string());

        let confirmed = SetAllRequest::new("19 ene", CellChoice::Clear).confirm();
        let updated = engine.apply_set_all(&grid, &confirmed);

        assert_eq!(updated.cell("A", "19 ene"), Some(""));
        assert_eq!(updated.cell("B", "19 ene"), Some(""));
    }

    #[test]
    fn set_all_marker_writes_the_glyph() {
        let engine = engine();
        let confirmed =
            SetAllRequest::new("20 ene", CellChoice::Marker(Marker::Rain)).confirm();
        let updated = engine.apply_set_all(&HoursGrid::default(), &confirmed);

        assert_eq!(updated.cell("B", "20 ene"), Some(Marker::Rain.glyph()));
        assert_eq!(engine.grand_total(&updated, "B"), "0.00");
    }

    #[test]
    fn pay_uses_displayed_hours() {
        let engine = engine();
        let mut grid = HoursGrid::default();
        grid.set("A", "19 ene", "20".to_string());
        grid.set("A", "20 ene", "20".to_string());

        let pay = engine.pay_summary(&grid, "A");
        assert_eq!(pay.total_hours, 40.0);
        assert_eq!(pay.total_neto_fixed(), "863.60");
    }
}
