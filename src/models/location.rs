use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
}

impl Location {
    /// Name used when reverse geocoding gives nothing back.
    pub fn fallback_name(lat: f64, lng: f64) -> String {
        format!("{:.5}, {:.5}", lat, lng)
    }

    /// The part of the place name before the first comma, as shown on the
    /// day header chip.
    pub fn short_name(&self) -> &str {
        self.name.split(',').next().unwrap_or_default().trim()
    }
}

/// A forward geocoding result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlaceCandidate {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
}

/// day label -> tagged location. Keyed by day only.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct LocationMap(pub BTreeMap<String, Location>);

impl LocationMap {
    pub fn get(&self, day: &str) -> Option<&Location> {
        self.0.get(day)
    }

    pub fn set(&mut self, day: &str, location: Location) {
        self.0.insert(day.to_string(), location);
    }

    /// Decodes a remote snapshot, skipping entries that do not look like a
    /// location.
    pub fn from_snapshot(value: Value) -> Self {
        let mut map = LocationMap::default();

        let Value::Object(entries) = value else {
            warn!("Location snapshot is not an object, ignoring it");
            return map;
        };

        for (day, entry) in entries {
            match serde_json::from_value::<Location>(entry) {
                Ok(location) => {
                    map.0.insert(day, location);
                }
                Err(e) => warn!("Dropping malformed location for {}: {}", day, e),
            }
        }

        map
    }

    pub fn to_snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fallback_name_uses_five_decimals() {
        assert_eq!(
            Location::fallback_name(-39.4928, 176.91205),
            "-39.49280, 176.91205"
        );
    }

    #[test]
    fn short_name_stops_at_first_comma() {
        let location = Location {
            lat: 0.0,
            lng: 0.0,
            name: "Havelock North, Hastings, Hawke's Bay".to_string(),
        };
        assert_eq!(location.short_name(), "Havelock North");
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let map = LocationMap::from_snapshot(json!({
            "19 ene": { "lat": 1.0, "lng": 2.0, "name": "Somewhere" },
            "20 ene": { "lat": "nope" },
        }));

        assert_eq!(map.0.len(), 1);
        assert_eq!(map.get("19 ene").map(|l| l.name.as_str()), Some("Somewhere"));
    }
}
