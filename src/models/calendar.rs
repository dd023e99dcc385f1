use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::HashSet;

use crate::errors::{TimesheetError, TimesheetResult};

const DAYS_PER_WEEK: usize = 7;

const MONTHS_SHORT: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sept", "oct", "nov", "dic",
];

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Day {
    /// Unique within a calendar; also the key used by the hours grid and the
    /// location mapping.
    pub display: String,
    pub day_name: String,
    pub iso: NaiveDate,
}

impl Day {
    pub fn new(date: NaiveDate) -> Self {
        Day {
            display: format!(
                "{:02} {}",
                date.day(),
                MONTHS_SHORT[date.month0() as usize]
            ),
            day_name: weekday_name(date.weekday()).to_string(),
            iso: date,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Week {
    pub label: String,
    pub days: Vec<Day>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub weeks: Vec<Week>,
}

impl Calendar {
    /// Builds the calendar between `start` and `end` (both inclusive), split
    /// into 7-day weeks counted from `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> TimesheetResult<Self> {
        if end < start {
            return Err(TimesheetError::Config(format!(
                "calendar end {} precedes start {}",
                end, start
            )));
        }

        let days: Vec<Day> = start
            .iter_days()
            .take_while(|date| *date <= end)
            .map(Day::new)
            .collect();

        let mut seen = HashSet::new();
        for day in &days {
            if !seen.insert(day.display.as_str()) {
                return Err(TimesheetError::Config(format!(
                    "calendar {} to {} repeats the day label '{}'",
                    start, end, day.display
                )));
            }
        }

        let weeks = days
            .chunks(DAYS_PER_WEEK)
            .enumerate()
            .map(|(index, chunk)| Week {
                label: format!("SEMANA {:02}", index + 1),
                days: chunk.to_vec(),
            })
            .collect();

        Ok(Calendar { start, end, weeks })
    }

    /// Builds a calendar from explicit weeks, bypassing date generation.
    /// Labels must still be unique.
    pub fn from_weeks(weeks: Vec<Week>) -> TimesheetResult<Self> {
        let mut seen = HashSet::new();
        for day in weeks.iter().flat_map(|week| week.days.iter()) {
            if !seen.insert(day.display.clone()) {
                return Err(TimesheetError::Config(format!(
                    "repeated day label '{}'",
                    day.display
                )));
            }
        }

        let mut dates = weeks.iter().flat_map(|week| week.days.iter().map(|d| d.iso));
        let first = dates
            .next()
            .ok_or_else(|| TimesheetError::Config("calendar has no days".to_string()))?;
        let last = dates.last().unwrap_or(first);

        Ok(Calendar {
            start: first,
            end: last,
            weeks,
        })
    }

    pub fn days(&self) -> impl Iterator<Item = &Day> {
        self.weeks.iter().flat_map(|week| week.days.iter())
    }

    pub fn day(&self, label: &str) -> Option<&Day> {
        self.days().find(|day| day.display == label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.day(label).is_some()
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "lunes",
        Weekday::Tue => "martes",
        Weekday::Wed => "miércoles",
        Weekday::Thu => "jueves",
        Weekday::Fri => "viernes",
        Weekday::Sat => "sábado",
        Weekday::Sun => "domingo",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn default_range_is_four_full_weeks() {
        let calendar = Calendar::new(date(2026, 1, 19), date(2026, 2, 15)).unwrap();

        assert_eq!(calendar.weeks.len(), 4);
        assert!(calendar.weeks.iter().all(|w| w.days.len() == 7));
        assert_eq!(calendar.weeks[0].label, "SEMANA 01");
        assert_eq!(calendar.weeks[0].days[0].display, "19 ene");
        assert_eq!(calendar.weeks[0].days[0].day_name, "lunes");
        assert_eq!(calendar.weeks[3].days[6].display, "15 feb");
        assert_eq!(calendar.weeks[3].days[6].day_name, "domingo");
    }

    #[test]
    fn last_week_may_be_short() {
        let calendar = Calendar::new(date(2026, 1, 19), date(2026, 1, 28)).unwrap();

        assert_eq!(calendar.weeks.len(), 2);
        assert_eq!(calendar.weeks[1].days.len(), 3);
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(Calendar::new(date(2026, 2, 1), date(2026, 1, 1)).is_err());
    }

    #[test]
    fn rejects_ranges_with_repeated_labels() {
        assert!(Calendar::new(date(2026, 1, 1), date(2027, 1, 1)).is_err());
    }

    #[test]
    fn looks_up_days_by_label() {
        let calendar = Calendar::new(date(2026, 1, 19), date(2026, 2, 15)).unwrap();

        assert_eq!(calendar.day("02 feb").map(|d| d.iso), Some(date(2026, 2, 2)));
        assert!(!calendar.contains("31 dic"));
    }
}
