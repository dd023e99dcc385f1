//! Firebase Realtime Database over its REST interface.
//!
//! Writes are `PUT {root}/{collection}.json`. Subscriptions hold a
//! server-sent event stream on the collection; a root `put` carries the full
//! value, anything else triggers a refetch of the whole collection so
//! subscribers still only ever see full snapshots.

use reqwest::{Client, header};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::store::{
    Collection, SnapshotSink, StateStore, StoreError, StoreUpdate, Subscription, is_empty_value,
};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub fn firebase_client_init() -> Result<Client, StoreError> {
    info!("Initializing Firebase client");

    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );

    match Client::builder().default_headers(headers).build() {
        Ok(client) => {
            info!("Firebase client initialized successfully");
            Ok(client)
        }
        Err(e) => {
            error!("Failed to build Firebase client: {}", e);
            Err(StoreError::Http(e))
        }
    }
}

#[derive(Clone)]
pub struct FirebaseStore {
    client: Client,
    root: String,
    auth: Option<String>,
}

impl FirebaseStore {
    pub fn new(client: Client, root: impl Into<String>, auth: Option<String>) -> Self {
        let root = root.into().trim_end_matches('/').to_string();
        FirebaseStore { client, root, auth }
    }

    fn collection_url(&self, collection: Collection) -> String {
        let mut url = format!("{}/{}.json", self.root, collection.name());
        if let Some(auth) = &self.auth {
            url.push_str("?auth=");
            url.push_str(auth);
        }
        url
    }

    /// Reads the whole collection once.
    pub async fn fetch(&self, collection: Collection) -> Result<Option<Value>, StoreError> {
        let url = self.collection_url(collection);
        debug!("Fetching {} from Firebase", collection);

        let response = self.client.get(&url).send().await?;
        let response = check_status(response).await?;
        let text = response.text().await?;
        let value: Value = serde_json::from_str(&text)?;

        Ok(Some(value).filter(|v| !is_empty_value(v)))
    }

    async fn stream_once(
        &self,
        collection: Collection,
        sink: &SnapshotSink,
    ) -> Result<(), StoreError> {
        let url = self.collection_url(collection);
        info!("Opening event stream for {}", collection);

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let mut response = check_status(response).await?;

        let mut events = EventBuffer::default();
        while let Some(chunk) = response.chunk().await? {
            for event in events.push(&chunk) {
                self.handle_event(collection, event, sink).await?;
            }
        }

        Err(StoreError::Closed(format!("{} stream ended", collection)))
    }

    async fn handle_event(
        &self,
        collection: Collection,
        event: ServerEvent,
        sink: &SnapshotSink,
    ) -> Result<(), StoreError> {
        match event.name.as_str() {
            "put" | "patch" => {
                let payload: EventPayload = serde_json::from_str(&event.data)?;
                if event.name == "put" && payload.path == "/" {
                    debug!("Received full {} snapshot", collection);
                    let snapshot = Some(payload.data).filter(|v| !is_empty_value(v));
                    sink(StoreUpdate::Snapshot(snapshot));
                } else {
                    debug!(
                        "Received partial {} update at {}, refetching",
                        collection, payload.path
                    );
                    sink(StoreUpdate::Snapshot(self.fetch(collection).await?));
                }
                Ok(())
            }
            "keep-alive" => Ok(()),
            "cancel" | "auth_revoked" => Err(StoreError::Closed(format!(
                "{} stream {}: {}",
                collection, event.name, event.data
            ))),
            other => {
                warn!("Ignoring unknown {} event '{}'", collection, other);
                Ok(())
            }
        }
    }
}

impl StateStore for FirebaseStore {
    fn subscribe(&self, collection: Collection, sink: SnapshotSink) -> Subscription {
        let store = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = store.stream_once(collection, &sink).await {
                    error!("Firebase stream for {} failed: {}", collection, e);
                    sink(StoreUpdate::Error(e));
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });

        Subscription::new(move || {
            info!("Closing Firebase subscription for {}", collection);
            handle.abort();
        })
    }

    async fn write(&self, collection: Collection, value: Value) -> Result<(), StoreError> {
        let url = self.collection_url(collection);
        info!("Writing {} to Firebase", collection);

        let body = serde_json::to_string(&value)?;
        let response = self.client.put(&url).body(body).send().await?;
        check_status(response).await?;

        info!("Firebase accepted {} write", collection);
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    error!("Firebase returned error status {}: {}", status, body);
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ServerEvent {
    name: String,
    data: String,
}

impl ServerEvent {
    /// Parses one `event:` / `data:` block of a server-sent event stream.
    fn parse(raw: &str) -> Option<ServerEvent> {
        let mut name = None;
        let mut data: Vec<&str> = Vec::new();

        for line in raw.lines() {
            let line = line.trim_end_matches('\r');
            if let Some(value) = line.strip_prefix("event:") {
                name = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                data.push(value.strip_prefix(' ').unwrap_or(value));
            }
        }

        name.map(|name| ServerEvent {
            name,
            data: data.join("\n"),
        })
    }
}

/// Reassembles server-sent events from raw network chunks. Chunks may split
/// a multi-byte character, so text is only decoded once an event is complete.
#[derive(Debug, Default)]
struct EventBuffer {
    pending: Vec<u8>,
}

impl EventBuffer {
    /// Appends `bytes` and returns every event they complete.
    fn push(&mut self, bytes: &[u8]) -> Vec<ServerEvent> {
        // 0x0D never occurs inside a multi-byte UTF-8 sequence
        self.pending
            .extend(bytes.iter().copied().filter(|byte| *byte != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.pending.windows(2).position(|pair| pair == b"\n\n") {
            let raw: Vec<u8> = self.pending.drain(..end + 2).collect();
            match String::from_utf8(raw) {
                Ok(text) => events.extend(ServerEvent::parse(&text)),
                Err(e) => warn!("Dropping server event that is not valid UTF-8: {}", e),
            }
        }
        events
    }
}

#[derive(Deserialize)]
struct EventPayload {
    path: String,
    #[serde(default)]
    data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hours::Marker;

    #[test]
    fn parses_put_events() {
        let event = ServerEvent::parse(
            "event: put\ndata: {\"path\":\"/\",\"data\":{\"A\":{\"19 ene\":\"8\"}}}\n\n",
        )
        .unwrap();

        assert_eq!(event.name, "put");
        let payload: EventPayload = serde_json::from_str(&event.data).unwrap();
        assert_eq!(payload.path, "/");
        assert_eq!(payload.data["A"]["19 ene"], "8");
    }

    #[test]
    fn keep_alive_has_null_data() {
        let event = ServerEvent::parse("event: keep-alive\r\ndata: null\r\n\r\n").unwrap();

        assert_eq!(event.name, "keep-alive");
        assert_eq!(event.data, "null");
    }

    #[test]
    fn events_split_inside_a_character_are_reassembled() {
        let raw = concat!(
            "event: put\r\n",
            "data: {\"path\":\"/\",\"data\":{\"B\":{\"19 ene\":\"🌧️\"}}}\r\n\r\n",
        );
        let bytes = raw.as_bytes();
        let glyph_start = raw.find('🌧').unwrap();
        let split = glyph_start + 2;

        let mut buffer = EventBuffer::default();
        assert!(buffer.push(&bytes[..split]).is_empty());
        let events = buffer.push(&bytes[split..]);

        assert_eq!(events.len(), 1);
        let payload: EventPayload = serde_json::from_str(&events[0].data).unwrap();
        assert_eq!(payload.data["B"]["19 ene"], "🌧️");
        assert_eq!(
            Marker::from_glyph(payload.data["B"]["19 ene"].as_str().unwrap()),
            Some(Marker::Rain)
        );
    }

    #[test]
    fn one_chunk_can_carry_several_events() {
        let mut buffer = EventBuffer::default();
        let events =
            buffer.push(b"event: keep-alive\ndata: null\n\nevent: put\ndata: {\"path\":\"/\"}");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "keep-alive");

        let events = buffer.push(b"\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "put");
    }

    #[test]
    fn blocks_without_event_name_are_ignored() {
        assert_eq!(ServerEvent::parse(": comment\n\n"), None);
    }

    #[test]
    fn urls_carry_collection_and_auth() {
        let client = Client::new();
        let store = FirebaseStore::new(
            client,
            "https://orchard.firebaseio.com/",
            Some("t0k".into()),
        );

        assert_eq!(
            store.collection_url(Collection::Locations),
            "https://orchard.firebaseio.com/work_locations.json?auth=t0k"
        );
    }
}
