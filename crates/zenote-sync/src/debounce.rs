//! Per-key debounce timers with single-flight tracking.
//!
//! Each key owns at most one pending timer. Scheduling again replaces it
//! (the window restarts). When a timer elapses it posts an [`Elapsed`] event
//! to the owner's channel; the owner asks [`DebounceQueue::poll_elapsed`]
//! what to do with it:
//!
//! - [`Due::Fire`]: issue the remote call now. The key is marked in flight.
//! - [`Due::Deferred`]: a call for the key is still in flight. The event is
//!   remembered and [`DebounceQueue::complete`] reports it when the call
//!   returns, so the owner can re-arm.
//! - [`Due::Stale`]: the timer was cancelled or superseded after it fired.
//!
//! The queue never captures content. What gets sent is read from the block
//! list when the event is handled, so a superseding edit is always the one
//! that reaches the store.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Timer-elapsed event for `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elapsed<K> {
    pub key: K,
    generation: u64,
}

/// What to do with an [`Elapsed`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    Fire,
    Deferred,
    Stale,
}

struct Entry {
    generation: u64,
    timer: AbortHandle,
}

/// Debounce timers keyed by `K`.
pub struct DebounceQueue<K> {
    window: Duration,
    tx: mpsc::UnboundedSender<Elapsed<K>>,
    pending: HashMap<K, Entry>,
    in_flight: HashSet<K>,
    deferred: HashSet<K>,
    next_generation: u64,
}

impl<K> DebounceQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(window: Duration, tx: mpsc::UnboundedSender<Elapsed<K>>) -> Self {
        Self {
            window,
            tx,
            pending: HashMap::new(),
            in_flight: HashSet::new(),
            deferred: HashSet::new(),
            next_generation: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// (Re)start the full window for `key`.
    pub fn schedule(&mut self, key: K) {
        self.schedule_in(key, self.window);
    }

    /// (Re)start the timer for `key` with an explicit delay.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_in(&mut self, key: K, delay: Duration) {
        if let Some(old) = self.pending.remove(&key) {
            old.timer.abort();
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let deadline = Instant::now() + delay;
        let tx = self.tx.clone();
        let event = Elapsed {
            key: key.clone(),
            generation,
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(event);
        });
        self.pending.insert(
            key,
            Entry {
                generation,
                timer: handle.abort_handle(),
            },
        );
    }

    /// Cancel the pending timer (and any deferred re-fire) for `key`.
    ///
    /// Returns whether anything was pending. An in-flight call is unaffected.
    pub fn cancel(&mut self, key: &K) -> bool {
        let deferred = self.deferred.remove(key);
        match self.pending.remove(key) {
            Some(entry) => {
                entry.timer.abort();
                true
            }
            None => deferred,
        }
    }

    /// Cancel everything that has not fired yet.
    pub fn cancel_all(&mut self) {
        for (_, entry) in self.pending.drain() {
            entry.timer.abort();
        }
        self.deferred.clear();
    }

    /// Classify an elapsed event and update bookkeeping.
    pub fn poll_elapsed(&mut self, event: &Elapsed<K>) -> Due {
        match self.pending.get(&event.key) {
            Some(entry) if entry.generation == event.generation => {}
            _ => return Due::Stale,
        }
        self.pending.remove(&event.key);

        if self.in_flight.contains(&event.key) {
            self.deferred.insert(event.key.clone());
            Due::Deferred
        } else {
            self.in_flight.insert(event.key.clone());
            Due::Fire
        }
    }

    /// The in-flight call for `key` returned. Returns true when an event was
    /// deferred behind it and the caller should re-arm.
    pub fn complete(&mut self, key: &K) -> bool {
        self.in_flight.remove(key);
        self.deferred.remove(key)
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key) || self.deferred.contains(key)
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.contains(key)
    }

    /// Neither pending nor in flight.
    pub fn is_idle(&self, key: &K) -> bool {
        !self.is_pending(key) && !self.is_in_flight(key)
    }

    /// Keys with a timer still running.
    pub fn pending_keys(&self) -> Vec<K> {
        self.pending.keys().cloned().collect()
    }

    /// No timers, no deferred fires, nothing in flight.
    pub fn is_quiet(&self) -> bool {
        self.pending.is_empty() && self.deferred.is_empty() && self.in_flight.is_empty()
    }
}

impl<K> Drop for DebounceQueue<K> {
    fn drop(&mut self) {
        for entry in self.pending.values() {
            entry.timer.abort();
        }
    }
}
