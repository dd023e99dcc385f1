use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::warn;

use crate::errors::TimesheetError;

/// Reserved cell values meaning "zero hours, for this reason".
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    Rain,
    ManAbsent,
    WomanAbsent,
}

impl Marker {
    pub const ALL: [Marker; 3] = [Marker::Rain, Marker::ManAbsent, Marker::WomanAbsent];

    /// The literal stored in the grid.
    pub fn glyph(self) -> &'static str {
        match self {
            Marker::Rain => "🌧️",
            Marker::ManAbsent => "🙅‍♂️",
            Marker::WomanAbsent => "🙅‍♀️",
        }
    }

    /// Text used where the glyph cannot be drawn.
    pub fn label(self) -> &'static str {
        match self {
            Marker::Rain => "LLUVIA",
            Marker::ManAbsent => "AUSENTE",
            Marker::WomanAbsent => "AUSENTE",
        }
    }

    pub fn from_glyph(value: &str) -> Option<Marker> {
        Marker::ALL.into_iter().find(|marker| marker.glyph() == value)
    }
}

/// Hour amounts offered by the cell picker: 0.5 to 12 in half-hour steps.
pub fn quick_pick_options() -> Vec<String> {
    (1..=24u32).map(|i| (f64::from(i) / 2.0).to_string()).collect()
}

/// One of the values the picker (or set-all) can write into a cell.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CellChoice {
    Hours(String),
    Marker(Marker),
    Clear,
}

impl CellChoice {
    /// The literal written to the grid. Clearing writes an empty string; the
    /// key is kept.
    pub fn cell_value(&self) -> String {
        match self {
            CellChoice::Hours(hours) => hours.clone(),
            CellChoice::Marker(marker) => marker.glyph().to_string(),
            CellChoice::Clear => String::new(),
        }
    }
}

impl FromStr for CellChoice {
    type Err = TimesheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "clear" | "CLEAR" => return Ok(CellChoice::Clear),
            "rain" => return Ok(CellChoice::Marker(Marker::Rain)),
            "man_absent" => return Ok(CellChoice::Marker(Marker::ManAbsent)),
            "woman_absent" => return Ok(CellChoice::Marker(Marker::WomanAbsent)),
            _ => {}
        }

        if let Some(marker) = Marker::from_glyph(trimmed) {
            return Ok(CellChoice::Marker(marker));
        }

        if quick_pick_options().iter().any(|option| option == trimmed) {
            return Ok(CellChoice::Hours(trimmed.to_string()));
        }

        Err(TimesheetError::UnknownChoice(s.to_string()))
    }
}

/// member -> day label -> raw cell value.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct HoursGrid(pub BTreeMap<String, BTreeMap<String, String>>);

impl HoursGrid {
    /// Grid with an empty day map for every member, used when the remote
    /// collection holds nothing yet.
    pub fn empty_for<'a>(roster: impl IntoIterator<Item = &'a String>) -> Self {
        HoursGrid(
            roster
                .into_iter()
                .map(|member| (member.clone(), BTreeMap::new()))
                .collect(),
        )
    }

    pub fn cell(&self, member: &str, day: &str) -> Option<&str> {
        self.0
            .get(member)
            .and_then(|days| days.get(day))
            .map(String::as_str)
    }

    pub fn member_cells(&self, member: &str) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .get(member)
            .into_iter()
            .flat_map(|days| days.iter().map(|(d, v)| (d.as_str(), v.as_str())))
    }

    pub fn set(&mut self, member: &str, day: &str, value: String) {
        self.0
            .entry(member.to_string())
            .or_default()
            .insert(day.to_string(), value);
    }

    /// Decodes a remote snapshot. Numbers are kept as their textual form;
    /// anything else that is not a string is dropped.
    pub fn from_snapshot(value: Value) -> Self {
        let mut grid = HoursGrid::default();

        let Value::Object(members) = value else {
            warn!("Hours snapshot is not an object, ignoring it");
            return grid;
        };

        for (member, days) in members {
            let entry = grid.0.entry(member.clone()).or_default();
            let Value::Object(days) = days else {
                warn!("Hours for {} are not an object, treating as empty", member);
                continue;
            };

            for (day, cell) in days {
                match cell {
                    Value::String(text) => {
                        entry.insert(day, text);
                    }
                    Value::Number(number) => {
                        entry.insert(day, number.to_string());
                    }
                    Value::Null => {}
                    other => warn!(
                        "Dropping non-text cell for {} on {}: {}",
                        member, day, other
                    ),
                }
            }
        }

        grid
    }

    pub fn to_snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// What a set-all would do, shown before the user confirms it.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SetAllPreview {
    pub day: String,
    pub value: String,
    pub members: Vec<String>,
}

/// A request to overwrite one day for every member. It must go through
/// [`SetAllRequest::confirm`] before the service will apply it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetAllRequest {
    pub day: String,
    pub choice: CellChoice,
}

impl SetAllRequest {
    pub fn new(day: impl Into<String>, choice: CellChoice) -> Self {
        SetAllRequest {
            day: day.into(),
            choice,
        }
    }

    pub fn preview<'a>(&self, roster: impl IntoIterator<Item = &'a String>) -> SetAllPreview {
        SetAllPreview {
            day: self.day.clone(),
            value: self.choice.cell_value(),
            members: roster.into_iter().cloned().collect(),
        }
    }

    pub fn confirm(self) -> ConfirmedSetAll {
        ConfirmedSetAll(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedSetAll(SetAllRequest);

impl ConfirmedSetAll {
    pub fn request(&self) -> &SetAllRequest {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quick_picks_cover_half_hours_to_twelve() {
        let options = quick_pick_options();

        assert_eq!(options.len(), 24);
        assert_eq!(options[0], "0.5");
        assert_eq!(options[1], "1");
        assert_eq!(options[23], "12");
    }

    #[test]
    fn choices_parse_from_names_glyphs_and_amounts() {
        assert_eq!("clear".parse::<CellChoice>().unwrap(), CellChoice::Clear);
        assert_eq!(
            "rain".parse::<CellChoice>().unwrap(),
            CellChoice::Marker(Marker::Rain)
        );
        assert_eq!(
            Marker::WomanAbsent.glyph().parse::<CellChoice>().unwrap(),
            CellChoice::Marker(Marker::WomanAbsent)
        );
        assert_eq!(
            "3.5".parse::<CellChoice>().unwrap(),
            CellChoice::Hours("3.5".to_string())
        );
        assert!("13".parse::<CellChoice>().is_err());
        assert!("banana".parse::<CellChoice>().is_err());
    }

    #[test]
    fn snapshot_decoding_is_lenient() {
        let grid = HoursGrid::from_snapshot(json!({
            "Alan": { "19 ene": "7,5", "20 ene": 4, "21 ene": true },
            "Ghis": "garbage",
        }));

        assert_eq!(grid.cell("Alan", "19 ene"), Some("7,5"));
        assert_eq!(grid.cell("Alan", "20 ene"), Some("4"));
        assert_eq!(grid.cell("Alan", "21 ene"), None);
        assert_eq!(grid.member_cells("Ghis").count(), 0);
    }

    #[test]
    fn empty_grid_has_a_map_per_member() {
        let roster = vec!["A".to_string(), "B".to_string()];
        let grid = HoursGrid::empty_for(&roster);

        assert_eq!(grid.to_snapshot(), json!({ "A": {}, "B": {} }));
    }
}
