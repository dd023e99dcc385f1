//! Render tree of the report page.
//!
//! [`ReportView::build`] turns the board into what the page shows. In
//! [`ViewMode::Export`] the same tree is produced with every section expanded
//! and the interactive overlays left out, ready to be handed to a renderer.

use serde::{Deserialize, Serialize};

use crate::engine::{PaySummary, TimesheetEngine, format_money, parse_hours};
use crate::helpers::timers::CountdownPhase;
use crate::models::{
    hours::{HoursGrid, Marker, quick_pick_options},
    location::LocationMap,
};

pub const REPORT_TITLE: &str = "Orchard TEAM";
pub const EXPORT_LAYOUT_WIDTH: u32 = 1200;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Interactive,
    Export,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReportView {
    pub title: String,
    pub mode: ViewMode,
    pub online: bool,
    /// Fixed layout width; `None` lets the page size itself.
    pub layout_width: Option<u32>,
    pub show_capture_button: bool,
    pub weeks: Vec<WeekSection>,
    pub pay_cards: Vec<PayCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picker: Option<PickerOptions>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct WeekSection {
    pub label: String,
    pub days: Vec<DayHeader>,
    pub rows: Vec<MemberRow>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DayHeader {
    pub display: String,
    pub day_name: String,
    pub iso: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationChip>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LocationChip {
    pub short_name: String,
    pub name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MemberRow {
    pub member: String,
    pub cells: Vec<CellView>,
    pub week_total: String,
    /// The member's pay email is counting down.
    pub highlighted: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CellView {
    pub day: String,
    pub value: String,
    pub hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<Marker>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PayCard {
    pub member: String,
    pub total_hours: String,
    pub gross_rate: String,
    pub rate_neto: String,
    pub rate_deductions: String,
    pub total_neto: String,
    pub total_deductions: String,
    pub email_configured: bool,
    /// Breakdown section; collapsed on the interactive page.
    pub details_expanded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CardStatus>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CardStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_left: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PickerOptions {
    pub hours: Vec<String>,
    pub markers: Vec<MarkerOption>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MarkerOption {
    pub marker: Marker,
    pub glyph: String,
}

impl PickerOptions {
    pub fn standard() -> Self {
        PickerOptions {
            hours: quick_pick_options(),
            markers: Marker::ALL
                .into_iter()
                .map(|marker| MarkerOption {
                    marker,
                    glyph: marker.glyph().to_string(),
                })
                .collect(),
        }
    }
}

/// Live per-member state the page overlays on the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberActivity {
    pub phase: CountdownPhase,
    pub notice: Option<String>,
}

impl ReportView {
    pub fn build<F>(
        engine: &TimesheetEngine,
        grid: &HoursGrid,
        locations: &LocationMap,
        online: bool,
        mode: ViewMode,
        activity: F,
    ) -> ReportView
    where
        F: Fn(&str) -> MemberActivity,
    {
        let config = engine.config();
        let export = mode == ViewMode::Export;

        let weeks = config
            .calendar
            .weeks
            .iter()
            .map(|week| WeekSection {
                label: week.label.clone(),
                days: week
                    .days
                    .iter()
                    .map(|day| DayHeader {
                        display: day.display.clone(),
                        day_name: day.day_name.clone(),
                        iso: day.iso.format("%Y-%m-%d").to_string(),
                        location: locations.get(&day.display).map(|location| LocationChip {
                            short_name: location.short_name().to_string(),
                            name: location.name.clone(),
                        }),
                    })
                    .collect(),
                rows: config
                    .roster
                    .iter()
                    .map(|member| MemberRow {
                        member: member.clone(),
                        cells: week
                            .days
                            .iter()
                            .map(|day| {
                                let value = grid.cell(member, &day.display).unwrap_or_default();
                                CellView {
                                    day: day.display.clone(),
                                    value: value.to_string(),
                                    hours: parse_hours(Some(value)),
                                    marker: Marker::from_glyph(value),
                                }
                            })
                            .collect(),
                        week_total: engine.weekly_total(grid, member, week),
                        highlighted: !export && activity(member).phase.is_active(),
                    })
                    .collect(),
            })
            .collect();

        let pay_cards = config
            .roster
            .iter()
            .map(|member| {
                let summary = engine.pay_summary(grid, member);
                let status = if export {
                    None
                } else {
                    let current = activity(member);
                    Some(CardStatus {
                        seconds_left: current.phase.seconds_left(),
                        notice: current.notice,
                    })
                };
                pay_card(
                    &summary,
                    &config.rates.gross_display,
                    config.recipient(member).is_some(),
                    export,
                    status,
                )
            })
            .collect();

        ReportView {
            title: REPORT_TITLE.to_string(),
            mode,
            online,
            layout_width: export.then_some(EXPORT_LAYOUT_WIDTH),
            show_capture_button: !export,
            weeks,
            pay_cards,
            picker: (!export).then(PickerOptions::standard),
        }
    }
}

fn pay_card(
    summary: &PaySummary,
    gross_rate: &str,
    email_configured: bool,
    details_expanded: bool,
    status: Option<CardStatus>,
) -> PayCard {
    PayCard {
        member: summary.member.clone(),
        total_hours: format!("{:.2}", summary.total_hours),
        gross_rate: gross_rate.to_string(),
        rate_neto: format_money(summary.rate_neto),
        rate_deductions: format_money(summary.rate_deductions),
        total_neto: format_money(summary.total_neto),
        total_deductions: format_money(summary.total_deductions),
        email_configured,
        details_expanded,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PayRates, TimesheetConfig};
    use crate::models::{calendar::Calendar, location::Location};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn engine() -> TimesheetEngine {
        let start = NaiveDate::from_ymd_opt(2026, 1, 19).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 1, 27).unwrap();
        let mut config = TimesheetConfig::new(
            vec!["A".to_string(), "B".to_string()],
            Calendar::new(start, end).unwrap(),
            PayRates::default(),
        );
        config.emails.insert("A".to_string(), "a@example.com".to_string());
        TimesheetEngine::new(Arc::new(config))
    }

    fn idle(_: &str) -> MemberActivity {
        MemberActivity {
            phase: CountdownPhase::Idle,
            notice: None,
        }
    }

    fn board() -> (HoursGrid, LocationMap) {
        let mut grid = HoursGrid::default();
        grid.set("A", "19 ene", "3,5".to_string());
        grid.set("A", "20 ene", "🌧️".to_string());
        grid.set("B", "26 ene", "1:30".to_string());

        let mut locations = LocationMap::default();
        locations.set(
            "19 ene",
            Location {
                lat: -39.6,
                lng: 176.8,
                name: "Havelock North, Hastings".to_string(),
            },
        );
        (grid, locations)
    }

    #[test]
    fn interactive_view_carries_overlays() {
        let engine = engine();
        let (grid, locations) = board();

        let activity = |member: &str| MemberActivity {
            phase: if member == "A" {
                CountdownPhase::Counting(3)
            } else {
                CountdownPhase::Idle
            },
            notice: None,
        };
        let view = ReportView::build(
            &engine,
            &grid,
            &locations,
            true,
            ViewMode::Interactive,
            activity,
        );

        assert!(view.show_capture_button);
        assert_eq!(view.layout_width, None);
        assert_eq!(view.picker.as_ref().map(|p| p.hours.len()), Some(24));
        assert!(view.weeks[0].rows[0].highlighted);
        assert!(!view.weeks[0].rows[1].highlighted);
        assert_eq!(
            view.pay_cards[0].status.as_ref().and_then(|s| s.seconds_left),
            Some(3)
        );
        assert!(!view.pay_cards[0].details_expanded);
    }

    #[test]
    fn export_view_strips_overlays_and_expands() {
        let engine = engine();
        let (grid, locations) = board();

        let view = ReportView::build(&engine, &grid, &locations, true, ViewMode::Export, idle);

        assert!(!view.show_capture_button);
        assert_eq!(view.layout_width, Some(EXPORT_LAYOUT_WIDTH));
        assert!(view.picker.is_none());
        assert!(view.pay_cards.iter().all(|card| card.details_expanded));
        assert!(view.pay_cards.iter().all(|card| card.status.is_none()));
        assert!(view.weeks.iter().flat_map(|w| &w.rows).all(|r| !r.highlighted));
    }

    #[test]
    fn cells_totals_and_locations_are_filled_in() {
        let engine = engine();
        let (grid, locations) = board();

        let view =
            ReportView::build(&engine, &grid, &locations, false, ViewMode::Interactive, idle);

        assert_eq!(view.weeks.len(), 2);
        let first = &view.weeks[0];
        assert_eq!(
            first.days[0].location.as_ref().map(|l| l.short_name.as_str()),
            Some("Havelock North")
        );
        assert!(first.days[1].location.is_none());

        let row_a = &first.rows[0];
        assert_eq!(row_a.cells[0].hours, 3.5);
        assert_eq!(row_a.cells[1].marker, Some(Marker::Rain));
        assert_eq!(row_a.cells[2].value, "");
        assert_eq!(row_a.week_total, "3.50");
        assert_eq!(view.weeks[1].rows[1].week_total, "1.50");

        assert_eq!(view.pay_cards[0].total_hours, "3.50");
        assert_eq!(view.pay_cards[0].gross_rate, "25.75");
        assert!(view.pay_cards[0].email_configured);
        assert!(!view.pay_cards[1].email_configured);
    }
}
