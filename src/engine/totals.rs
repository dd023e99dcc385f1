use serde::Serialize;
use tracing::debug;

use super::parser::parse_hours;
use crate::config::GrandTotalScope;
use crate::models::{
    calendar::{Calendar, Day},
    hours::HoursGrid,
};

/// Two-decimal fixed display used for every hour total.
pub fn format_hours(hours: f64) -> String {
    format!("{:.2}", hours)
}

/// Sums the parsed hours of `member` over `days`. Days with no cell count as
/// zero.
pub fn sum_hours<'a>(
    grid: &HoursGrid,
    member: &str,
    days: impl IntoIterator<Item = &'a Day>,
) -> f64 {
    days.into_iter()
        .map(|day| cell_hours(grid, member, &day.display))
        .sum()
}

pub fn weekly_total<'a>(
    grid: &HoursGrid,
    member: &str,
    days: impl IntoIterator<Item = &'a Day>,
) -> String {
    format_hours(sum_hours(grid, member, days))
}

/// Grand total hours for `member`.
///
/// With [`GrandTotalScope::AllKeys`] every key stored for the member counts,
/// even days outside `calendar`.
pub fn grand_total_hours(
    grid: &HoursGrid,
    member: &str,
    calendar: &Calendar,
    scope: GrandTotalScope,
) -> f64 {
    match scope {
        GrandTotalScope::AllKeys => grid
            .member_cells(member)
            .map(|(day, value)| {
                if !calendar.contains(day) {
                    debug!("Counting {} hours outside the calendar on '{}'", member, day);
                }
                value_hours(member, day, value)
            })
            .sum(),
        GrandTotalScope::Calendar => sum_hours(grid, member, calendar.days()),
    }
}

pub fn grand_total(
    grid: &HoursGrid,
    member: &str,
    calendar: &Calendar,
    scope: GrandTotalScope,
) -> String {
    format_hours(grand_total_hours(grid, member, calendar, scope))
}

fn cell_hours(grid: &HoursGrid, member: &str, day: &str) -> f64 {
    match grid.cell(member, day) {
        Some(value) => value_hours(member, day, value),
        None => 0.0,
    }
}

fn value_hours(member: &str, day: &str, value: &str) -> f64 {
    let hours = parse_hours(Some(value));
    if hours < 0.0 {
        debug!("Negative entry {} for {} on '{}'", hours, member, day);
    }
    hours
}

/// All totals for one member: one figure per week and the grand total.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MemberTotals {
    pub member: String,
    pub weekly: Vec<String>,
    pub grand_total: String,
}

pub fn member_totals(
    grid: &HoursGrid,
    member: &str,
    calendar: &Calendar,
    scope: GrandTotalScope,
) -> MemberTotals {
    MemberTotals {
        member: member.to_string(),
        weekly: calendar
            .weeks
            .iter()
            .map(|week| weekly_total(grid, member, &week.days))
            .collect(),
        grand_total: grand_total(grid, member, calendar, scope),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};

    fn calendar(days: u64) -> Calendar {
        let start = NaiveDate::from_ymd_opt(2026, 1, 19).unwrap();
        Calendar::new(start, start + Days::new(days - 1)).unwrap()
    }

    #[test]
    fn empty_week_is_zero() {
        let calendar = calendar(7);
        let grid = HoursGrid::default();

        assert_eq!(weekly_total(&grid, "A", &calendar.weeks[0].days), "0.00");
    }

    #[test]
    fn two_day_week_scenario() {
        let calendar = calendar(2);
        let mut grid = HoursGrid::default();
        grid.set("A", "19 ene", "3,5".to_string());
        grid.set("A", "20 ene", "1:30".to_string());

        assert_eq!(weekly_total(&grid, "A", &calendar.weeks[0].days), "5.00");
        assert_eq!(weekly_total(&grid, "B", &calendar.weeks[0].days), "0.00");
    }

    #[test]
    fn weekly_total_only_reads_its_days() {
        let calendar = calendar(14);
        let mut grid = HoursGrid::default();
        grid.set("A", "19 ene", "8".to_string());
        grid.set("A", "26 ene", "4".to_string());

        assert_eq!(weekly_total(&grid, "A", &calendar.weeks[0].days), "8.00");
        assert_eq!(weekly_total(&grid, "A", &calendar.weeks[1].days), "4.00");
    }

    #[test]
    fn grand_total_counts_every_stored_key_by_default() {
        let calendar = calendar(7);
        let mut grid = HoursGrid::default();
        grid.set("A", "19 ene", "8".to_string());
        grid.set("A", "26 ene", "4".to_string());
        grid.set("A", "legacy", "1,25".to_string());

        let all = grand_total(&grid, "A", &calendar, GrandTotalScope::AllKeys);
        assert_eq!(all, "13.25");
        assert_eq!(all, grand_total(&grid, "A", &calendar, GrandTotalScope::AllKeys));

        assert_eq!(
            grand_total(&grid, "A", &calendar, GrandTotalScope::Calendar),
            "8.00"
        );
    }

    #[test]
    fn markers_and_blanks_add_nothing() {
        let calendar = calendar(3);
        let mut grid = HoursGrid::default();
        grid.set("A", "19 ene", "🌧️".to_string());
        grid.set("A", "20 ene", String::new());
        grid.set("A", "21 ene", "2:15".to_string());

        assert_eq!(
            grand_total(&grid, "A", &calendar, GrandTotalScope::AllKeys),
            "2.25"
        );
    }

    #[test]
    fn negative_entries_reduce_totals() {
        let calendar = calendar(2);
        let mut grid = HoursGrid::default();
        grid.set("A", "19 ene", "8".to_string());
        grid.set("A", "20 ene", "-2".to_string());

        assert_eq!(weekly_total(&grid, "A", &calendar.weeks[0].days), "6.00");
    }

    #[test]
    fn member_totals_lists_each_week() {
        let calendar = calendar(10);
        let mut grid = HoursGrid::default();
        grid.set("A", "19 ene", "7,5".to_string());
        grid.set("A", "28 ene", "2".to_string());

        let totals = member_totals(&grid, "A", &calendar, GrandTotalScope::AllKeys);
        assert_eq!(totals.weekly, vec!["7.50".to_string(), "2.00".to_string()]);
        assert_eq!(totals.grand_total, "9.50");
    }
}
