//! Keyed, cancellable delayed actions.
//!
//! [`TimerSet`] owns one tokio task per subject. [`Countdowns`] and
//! [`Notices`] build the per-member email countdown and the transient notice
//! banners on top of it. Dropping any of them aborts every outstanding task.

use serde::Serialize;
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct TimerSet {
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` for `subject`, aborting whatever was scheduled for it
    /// before.
    pub fn spawn<F>(&self, subject: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        if let Some(previous) = lock(&self.handles).insert(subject.to_string(), handle) {
            previous.abort();
        }
    }

    /// Runs `action` once after `delay`.
    pub fn schedule<F>(&self, subject: &str, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(subject, async move {
            tokio::time::sleep(delay).await;
            action();
        });
    }

    pub fn cancel(&self, subject: &str) {
        if let Some(handle) = lock(&self.handles).remove(subject) {
            handle.abort();
        }
    }

    pub fn cancel_all(&self) {
        let mut handles = lock(&self.handles);
        if !handles.is_empty() {
            debug!("Cancelling {} timers", handles.len());
        }
        for (_, handle) in handles.drain() {
            handle.abort();
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "phase", content = "seconds", rename_all = "snake_case")]
pub enum CountdownPhase {
    Idle,
    Counting(u32),
    Firing,
    Cooldown,
}

impl CountdownPhase {
    pub fn is_active(self) -> bool {
        !matches!(self, CountdownPhase::Idle)
    }

    /// Seconds shown on the button; `0` while firing or cooling down.
    pub fn seconds_left(self) -> Option<u32> {
        match self {
            CountdownPhase::Idle => None,
            CountdownPhase::Counting(n) => Some(n),
            CountdownPhase::Firing | CountdownPhase::Cooldown => Some(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownSettings {
    pub start: u32,
    pub tick: Duration,
    pub cooldown: Duration,
}

impl Default for CountdownSettings {
    fn default() -> Self {
        CountdownSettings {
            start: 5,
            tick: Duration::from_secs(1),
            cooldown: Duration::from_millis(800),
        }
    }
}

/// Per-subject `Idle -> Counting(n) -> Firing -> Cooldown -> Idle`.
pub struct Countdowns {
    settings: CountdownSettings,
    phases: Arc<Mutex<HashMap<String, CountdownPhase>>>,
    timers: TimerSet,
}

impl Countdowns {
    pub fn new(settings: CountdownSettings) -> Self {
        Countdowns {
            settings,
            phases: Arc::new(Mutex::new(HashMap::new())),
            timers: TimerSet::new(),
        }
    }

    pub fn phase(&self, subject: &str) -> CountdownPhase {
        lock(&self.phases)
            .get(subject)
            .copied()
            .unwrap_or(CountdownPhase::Idle)
    }

    /// Starts a countdown that runs `effect` once when it reaches zero.
    ///
    /// Returns `false` without doing anything if `subject` already has a
    /// countdown in any phase other than idle.
    pub fn start<F, Fut>(&self, subject: &str, effect: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        {
            let mut phases = lock(&self.phases);
            if phases.get(subject).is_some_and(|phase| phase.is_active()) {
                debug!("Countdown for {} already running", subject);
                return false;
            }
            phases.insert(subject.to_string(), CountdownPhase::Counting(self.settings.start));
        }

        info!(
            "Starting {}s countdown for {}",
            self.settings.start, subject
        );

        let phases = Arc::clone(&self.phases);
        let settings = self.settings;
        let key = subject.to_string();

        self.timers.spawn(subject, async move {
            loop {
                tokio::time::sleep(settings.tick).await;
                let mut guard = lock(&phases);
                match guard.get(&key).copied() {
                    Some(CountdownPhase::Counting(n)) if n > 1 => {
                        guard.insert(key.clone(), CountdownPhase::Counting(n - 1));
                    }
                    Some(CountdownPhase::Counting(_)) => {
                        guard.insert(key.clone(), CountdownPhase::Firing);
                        break;
                    }
                    _ => return,
                }
            }

            debug!("Countdown for {} reached zero", key);
            effect().await;

            lock(&phases).insert(key.clone(), CountdownPhase::Cooldown);
            tokio::time::sleep(settings.cooldown).await;
            lock(&phases).remove(&key);
        });

        true
    }

    pub fn cancel(&self, subject: &str) {
        self.timers.cancel(subject);
        lock(&self.phases).remove(subject);
    }

    pub fn cancel_all(&self) {
        self.timers.cancel_all();
        lock(&self.phases).clear();
    }
}

impl Default for Countdowns {
    fn default() -> Self {
        Self::new(CountdownSettings::default())
    }
}

/// Short-lived status messages, one per subject.
pub struct Notices {
    ttl: Duration,
    messages: Arc<Mutex<HashMap<String, String>>>,
    timers: TimerSet,
}

impl Notices {
    pub fn new(ttl: Duration) -> Self {
        Notices {
            ttl,
            messages: Arc::new(Mutex::new(HashMap::new())),
            timers: TimerSet::new(),
        }
    }

    /// Shows `message` for `subject`, replacing any current one, and clears
    /// it after the configured time.
    pub fn post(&self, subject: &str, message: impl Into<String>) {
        lock(&self.messages).insert(subject.to_string(), message.into());

        let messages = Arc::clone(&self.messages);
        let key = subject.to_string();
        self.timers.schedule(subject, self.ttl, move || {
            lock(&messages).remove(&key);
        });
    }

    pub fn get(&self, subject: &str) -> Option<String> {
        lock(&self.messages).get(subject).cloned()
    }

    pub fn cancel_all(&self) {
        self.timers.cancel_all();
        lock(&self.messages).clear();
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self::new(Duration::from_secs(4))
    }
}
