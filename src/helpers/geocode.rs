use reqwest::{Client, header};
use serde::Deserialize;
use std::future::Future;
use tracing::{error, info, warn};

use crate::models::location::PlaceCandidate;

/// Most candidates a forward search returns.
pub const SEARCH_LIMIT: usize = 6;

/// Forward and reverse geocoding. Implementations never fail outright:
/// lookups that go wrong yield `None` or an empty list.
pub trait Geocoder: Send + Sync + 'static {
    fn reverse(&self, lat: f64, lon: f64) -> impl Future<Output = Option<String>> + Send;

    fn search(&self, query: &str) -> impl Future<Output = Vec<PlaceCandidate>> + Send;
}

pub fn nominatim_client_init(user_agent: &str) -> Result<Client, reqwest::Error> {
    info!("Initializing Nominatim client");

    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static("es"),
    );

    match Client::builder()
        .default_headers(headers)
        .user_agent(user_agent.to_string())
        .build()
    {
        Ok(client) => {
            info!("Nominatim client initialized successfully");
            Ok(client)
        }
        Err(e) => {
            error!("Failed to build Nominatim client: {}", e);
            Err(e)
        }
    }
}

#[derive(Clone)]
pub struct NominatimClient {
    client: Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        NominatimClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Option<String> {
        let response = match self.client.get(url).query(query).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    warn!("Nominatim returned status {} for {}", resp.status(), url);
                    return None;
                }
                resp
            }
            Err(e) => {
                warn!("Failed to reach Nominatim: {}", e);
                return None;
            }
        };

        match response.text().await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Failed to read Nominatim response: {}", e);
                None
            }
        }
    }
}

#[derive(Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: String,
}

impl Geocoder for NominatimClient {
    async fn reverse(&self, lat: f64, lon: f64) -> Option<String> {
        let url = format!("{}/reverse", self.base_url);
        info!("Reverse geocoding {}, {}", lat, lon);

        let text = self
            .get_text(
                &url,
                &[
                    ("format", "jsonv2".to_string()),
                    ("lat", lat.to_string()),
                    ("lon", lon.to_string()),
                ],
            )
            .await?;

        match serde_json::from_str::<ReverseResponse>(&text) {
            Ok(parsed) => parsed.display_name.filter(|name| !name.trim().is_empty()),
            Err(e) => {
                warn!("Failed to parse reverse geocoding response: {}", e);
                None
            }
        }
    }

    async fn search(&self, query: &str) -> Vec<PlaceCandidate> {
        let url = format!("{}/search", self.base_url);
        info!("Searching places for '{}'", query);

        let Some(text) = self
            .get_text(
                &url,
                &[
                    ("format", "jsonv2".to_string()),
                    ("q", query.to_string()),
                    ("limit", SEARCH_LIMIT.to_string()),
                ],
            )
            .await
        else {
            return Vec::new();
        };

        let candidates = match serde_json::from_str::<Vec<SearchHit>>(&text) {
            Ok(hits) => parse_hits(hits),
            Err(e) => {
                warn!("Failed to parse search response: {}", e);
                Vec::new()
            }
        };

        info!("Found {} places for '{}'", candidates.len(), query);
        candidates
    }
}

fn parse_hits(hits: Vec<SearchHit>) -> Vec<PlaceCandidate> {
    hits.into_iter()
        .filter_map(|hit| {
            let lat = hit.lat.parse::<f64>().ok()?;
            let lon = hit.lon.parse::<f64>().ok()?;
            Some(PlaceCandidate {
                lat,
                lon,
                display_name: hit.display_name,
            })
        })
        .take(SEARCH_LIMIT)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_hits_with_bad_coordinates_are_dropped() {
        let hits: Vec<SearchHit> = serde_json::from_str(
            r#"[
                {"lat": "-39.64", "lon": "176.84", "display_name": "Hastings, Hawke's Bay"},
                {"lat": "n/a", "lon": "176.84", "display_name": "Broken"}
            ]"#,
        )
        .unwrap();

        let candidates = parse_hits(hits);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].lat, -39.64);
        assert_eq!(candidates[0].display_name, "Hastings, Hawke's Bay");
    }

    #[test]
    fn results_are_capped() {
        let hits = (0..10)
            .map(|i| SearchHit {
                lat: i.to_string(),
                lon: i.to_string(),
                display_name: format!("Place {}", i),
            })
            .collect();

        assert_eq!(parse_hits(hits).len(), SEARCH_LIMIT);
    }
}
