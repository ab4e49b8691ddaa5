//! Per-submission polling state for the report wait page.
//!
//! The first time a pending report is requested the page reloads after the
//! initial interval. Later polls reload after the time elapsed since that
//! first poll, so the interval grows and never shrinks. Past `give_up_after`
//! the client is told to stop; past `reset_after` the clock restarts, letting
//! a returning user poll again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub give_up_after: Duration,
    pub reset_after: Duration,
    /// Entries untouched for this long are dropped by the sweeper.
    pub entry_ttl: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            give_up_after: Duration::from_secs(10),
            reset_after: Duration::from_secs(20),
            entry_ttl: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Show the wait page, reloading after this long.
    Wait(Duration),
    GiveUp,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    first_seen: Instant,
    last_seen: Instant,
}

pub struct PollTracker {
    policy: PollPolicy,
    entries: Mutex<HashMap<String, Entry>>,
}

impl PollTracker {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn observe(&self, id: &str) -> PollDecision {
        self.observe_at(id, Instant::now())
    }

    pub fn observe_at(&self, id: &str, now: Instant) -> PollDecision {
        let mut entries = self.entries();

        let entry = match entries.get_mut(id) {
            Some(entry) => entry,
            None => {
                entries.insert(
                    id.to_string(),
                    Entry {
                        first_seen: now,
                        last_seen: now,
                    },
                );
                return PollDecision::Wait(self.policy.initial_interval);
            }
        };

        let mut elapsed = now.saturating_duration_since(entry.first_seen);
        if elapsed > self.policy.reset_after {
            debug!(submission_id = %id, "Restarting poll clock");
            entry.first_seen = now;
            elapsed = Duration::ZERO;
        }
        entry.last_seen = now;

        if elapsed > self.policy.give_up_after {
            PollDecision::GiveUp
        } else {
            PollDecision::Wait(elapsed.max(self.policy.initial_interval))
        }
    }

    /// Drop state for a submission whose result has been served.
    pub fn forget(&self, id: &str) {
        self.entries().remove(id);
    }

    /// Remove entries idle for longer than the TTL. Returns how many went.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let ttl = self.policy.entry_ttl;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.last_seen) <= ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // a panic while holding the lock leaves the map itself consistent
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Background task evicting stale poll entries.
pub struct Sweeper {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub fn spawn(tracker: Arc<PollTracker>, every: Duration) -> Self {
        let (shutdown, mut stop) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = tracker.evict_expired(Instant::now());
                        if evicted > 0 {
                            debug!(evicted, remaining = tracker.len(), "Evicted stale poll state");
                        }
                    }
                    _ = &mut stop => break,
                }
            }
        });
        Self { shutdown, handle }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}
