//! Push/subscribe store holding the two shared collections.
//!
//! Writes always replace a whole collection and subscribers always receive
//! the whole collection. There are no deltas and no merge: the last writer
//! wins.

use serde_json::Value;
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Hours,
    Locations,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Hours => "work_hours",
            Collection::Locations => "work_locations",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request to store failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode store payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("store closed the stream: {0}")]
    Closed(String),
}

/// What a subscriber receives.
#[derive(Debug)]
pub enum StoreUpdate {
    /// The full collection; `None` when the collection holds nothing.
    Snapshot(Option<Value>),
    Error(StoreError),
}

pub type SnapshotSink = Arc<dyn Fn(StoreUpdate) + Send + Sync>;

/// Handle returned by [`StateStore::subscribe`]. Delivery stops when it is
/// dropped or [`Subscription::unsubscribe`] is called.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

pub trait StateStore: Send + Sync + 'static {
    /// Delivers the current value and then every later change of
    /// `collection` to `sink`.
    fn subscribe(&self, collection: Collection, sink: SnapshotSink) -> Subscription;

    /// Replaces the whole collection with `value`.
    fn write(
        &self,
        collection: Collection,
        value: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Default)]
struct MemoryInner {
    values: HashMap<Collection, Value>,
    sinks: HashMap<Collection, Vec<(u64, SnapshotSink)>>,
    next_id: u64,
}

/// In-process store. Subscribers are called synchronously on every write.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `value` for `collection`.
    pub fn with_value(collection: Collection, value: Value) -> Self {
        let store = Self::new();
        store.lock().values.insert(collection, value);
        store
    }

    pub fn value(&self, collection: Collection) -> Option<Value> {
        self.lock().values.get(&collection).cloned()
    }

    pub fn subscriber_count(&self, collection: Collection) -> usize {
        self.lock().sinks.get(&collection).map_or(0, Vec::len)
    }

    /// Replaces a collection as if another client had written it.
    pub fn put(&self, collection: Collection, value: Value) {
        let sinks = {
            let mut inner = self.lock();
            inner.values.insert(collection, value.clone());
            inner.sinks.get(&collection).cloned().unwrap_or_default()
        };

        let snapshot = Some(value).filter(|v| !is_empty_value(v));
        for (_, sink) in sinks {
            sink(StoreUpdate::Snapshot(snapshot.clone()));
        }
    }

    /// Sends an error to every subscriber of `collection`.
    pub fn fail(&self, collection: Collection, reason: &str) {
        let sinks = self.lock().sinks.get(&collection).cloned().unwrap_or_default();
        for (_, sink) in sinks {
            sink(StoreUpdate::Error(StoreError::Closed(reason.to_string())));
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateStore for MemoryStore {
    fn subscribe(&self, collection: Collection, sink: SnapshotSink) -> Subscription {
        let (id, current) = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner
                .sinks
                .entry(collection)
                .or_default()
                .push((id, Arc::clone(&sink)));
            (id, inner.values.get(&collection).cloned())
        };

        debug!("Memory store subscriber {} on {}", id, collection);
        sink(StoreUpdate::Snapshot(current.filter(|v| !is_empty_value(v))));

        let inner = Arc::clone(&self.inner);
        Subscription::new(move || {
            let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(sinks) = inner.sinks.get_mut(&collection) {
                sinks.retain(|(sink_id, _)| *sink_id != id);
            }
        })
    }

    async fn write(&self, collection: Collection, value: Value) -> Result<(), StoreError> {
        info!("Writing {} to memory store", collection);
        self.put(collection, value);
        Ok(())
    }
}

/// Fire-and-forget writes that reach the store in the order they were queued.
///
/// Each collection gets one writer task, started on first use. Every value is
/// a full snapshot, so when several are waiting only the newest is written.
pub struct OrderedWrites<S> {
    store: Arc<S>,
    queues: Mutex<HashMap<Collection, mpsc::UnboundedSender<Value>>>,
}

impl<S: StateStore> OrderedWrites<S> {
    pub fn new(store: Arc<S>) -> Self {
        OrderedWrites {
            store,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Queues `value` as the next write of `collection`. Must be called from
    /// within a tokio runtime.
    pub fn enqueue(&self, collection: Collection, value: Value) {
        let mut queues = self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = queues
            .entry(collection)
            .or_insert_with(|| spawn_writer(Arc::clone(&self.store), collection));

        if let Err(mpsc::error::SendError(value)) = sender.send(value) {
            error!("Writer for {} stopped, starting a new one", collection);
            let sender = spawn_writer(Arc::clone(&self.store), collection);
            if sender.send(value).is_ok() {
                queues.insert(collection, sender);
            }
        }
    }
}

fn spawn_writer<S: StateStore>(
    store: Arc<S>,
    collection: Collection,
) -> mpsc::UnboundedSender<Value> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Value>();

    tokio::spawn(async move {
        while let Some(mut value) = receiver.recv().await {
            let mut skipped = 0;
            while let Ok(newer) = receiver.try_recv() {
                value = newer;
                skipped += 1;
            }
            if skipped > 0 {
                debug!("Skipping {} superseded {} writes", skipped, collection);
            }

            if let Err(e) = store.write(collection, value).await {
                error!("Failed to sync {}: {}", collection, e);
            }
        }
        debug!("Writer for {} finished", collection);
    });

    sender
}

/// Realtime databases report an empty collection as `null`; an empty object
/// reads the same way.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (SnapshotSink, Arc<Mutex<Vec<Option<Value>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let sink: SnapshotSink = Arc::new(move |update: StoreUpdate| {
            if let StoreUpdate::Snapshot(value) = update {
                log.lock().unwrap().push(value);
            }
        });
        (sink, seen)
    }

    #[tokio::test]
    async fn subscribers_get_current_value_then_changes() {
        let store = MemoryStore::with_value(Collection::Hours, json!({ "A": { "19 ene": "8" } }));
        let (sink, seen) = recorder();

        let subscription = store.subscribe(Collection::Hours, sink);
        store
            .write(Collection::Hours, json!({ "A": { "19 ene": "9" } }))
            .await
            .unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], Some(json!({ "A": { "19 ene": "9" } })));
        drop(subscription);
    }

    #[test]
    fn empty_collections_arrive_as_none() {
        let store = MemoryStore::new();
        let (sink, seen) = recorder();

        let _subscription = store.subscribe(Collection::Locations, sink);
        store.put(Collection::Locations, json!({}));

        assert_eq!(*seen.lock().unwrap(), vec![None, None]);
    }

    /// Memory store whose first write is slow.
    struct LaggingStore {
        inner: MemoryStore,
        writes: std::sync::atomic::AtomicUsize,
    }

    impl StateStore for LaggingStore {
        fn subscribe(&self, collection: Collection, sink: SnapshotSink) -> Subscription {
            self.inner.subscribe(collection, sink)
        }

        async fn write(&self, collection: Collection, value: Value) -> Result<(), StoreError> {
            let n = self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            self.inner.write(collection, value).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ordered_writes_land_in_queue_order() {
        let store = Arc::new(LaggingStore {
            inner: MemoryStore::new(),
            writes: Default::default(),
        });
        let writes = OrderedWrites::new(Arc::clone(&store));

        writes.enqueue(Collection::Hours, json!({ "A": { "19 ene": "8" } }));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        writes.enqueue(Collection::Hours, json!({ "A": { "19 ene": "9" } }));
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        assert_eq!(
            store.inner.value(Collection::Hours),
            Some(json!({ "A": { "19 ene": "9" } }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn queued_snapshots_collapse_to_the_newest() {
        let store = Arc::new(LaggingStore {
            inner: MemoryStore::new(),
            writes: Default::default(),
        });
        let writes = OrderedWrites::new(Arc::clone(&store));

        for value in ["1", "2", "3"] {
            writes.enqueue(Collection::Locations, json!({ "19 ene": value }));
        }
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        assert_eq!(
            store.inner.value(Collection::Locations),
            Some(json!({ "19 ene": "3" }))
        );
        assert_eq!(store.writes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let store = MemoryStore::new();
        let (sink, seen) = recorder();

        let subscription = store.subscribe(Collection::Hours, sink);
        assert_eq!(store.subscriber_count(Collection::Hours), 1);
        subscription.unsubscribe();
        assert_eq!(store.subscriber_count(Collection::Hours), 0);

        store.put(Collection::Hours, json!({ "A": {} }));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
