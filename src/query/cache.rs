//! Observable query cache with subscription-driven polling.
//!
//! [`QueryCache`] is the single source of truth for query state. Consumers
//! subscribe to a query key and receive a [`QueryResult`] snapshot on every
//! change; invalidating a key triggers at most one fetch through the
//! configured [`Fetch`] transport, and keys with a positive
//! [`stale_time`](crate::query::QueryMeta::stale_time) are re-fetched on a
//! recurring timer for as long as they have subscribers.
//!
//! # Design Pattern: Subscription-based State Management
//!
//! State flows one way: consumers never mutate entries directly, only
//! through [`subscribe`](QueryCache::subscribe),
//! [`set_query_data`](QueryCache::set_query_data), and
//! [`invalidate`](QueryCache::invalidate). Every mutation notifies all
//! subscribers of the key with a complete snapshot and re-evaluates the
//! key's refetch timer, so a key with zero subscribers never polls.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use ebb::client::FetchClient;
//! use ebb::query::{MetaUpdate, QueryCache};
//!
//! # fn run() -> Result<(), ebb::client::FetchError> {
//! let cache = QueryCache::new(Arc::new(FetchClient::new()?));
//!
//! let subscription = cache.subscribe(
//!     "/users",
//!     |snapshot| println!("fetching: {}", snapshot.is_fetching),
//!     MetaUpdate::stale_time(Duration::from_secs(30)),
//! );
//!
//! // Trigger the first fetch; the subscriber is notified of the pending
//! // state and then of the outcome.
//! cache.invalidate("/users");
//!
//! // Later, on teardown:
//! subscription.unsubscribe();
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{Fetch, FetchResult, FetchSuccess};

use super::entry::{MetaUpdate, QueryResult};

type Callback = Arc<dyn Fn(&QueryResult) + Send + Sync>;

/// Handle to the shared query cache.
///
/// Cloning is cheap and every clone operates on the same state; construct
/// one cache at application start and pass clones to all consumers. A
/// Tokio runtime must be current when operating the cache, since fetches
/// and refetch timers run as background tasks.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Fetch>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    subscribers: HashMap<String, HashMap<u64, Callback>>,
    timers: HashMap<String, CancellationToken>,
    next_subscriber: u64,
}

struct Entry {
    result: QueryResult,
    /// Fencing token: bumped on every fetch start and every write-through.
    /// A fetch outcome applies only while the epoch it started with is
    /// still current.
    epoch: u64,
}

impl Entry {
    fn new() -> Self {
        Self {
            result: QueryResult::default(),
            epoch: 0,
        }
    }
}

impl State {
    fn callbacks_for(&self, key: &str) -> Vec<Callback> {
        self.subscribers
            .get(key)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    fn has_subscribers(&self, key: &str) -> bool {
        self.subscribers.get(key).is_some_and(|set| !set.is_empty())
    }
}

impl QueryCache {
    /// Creates a cache that resolves query keys through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Fetch>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Returns the current snapshot for `key`, or `None` if the key was
    /// never initialized. Pure read, no side effects.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<QueryResult> {
        self.state().entries.get(key).map(|entry| entry.result.clone())
    }

    /// Subscribes `callback` to state changes of `key`.
    ///
    /// Creates a default entry for the key if none exists, merges `meta`
    /// into it (latest update wins per field), and synchronously delivers
    /// the current snapshot to `callback` before returning. No fetch is
    /// forced: callers decide whether to [`invalidate`](Self::invalidate)
    /// afterwards, which keeps eager, lazy, and server-rendered-then-
    /// hydrated strategies possible at the consumer layer.
    ///
    /// The returned guard unsubscribes on [`unsubscribe`] or drop. When the
    /// last subscriber of a key goes away its refetch timer stops, but the
    /// entry itself is kept so a late resubscription sees prior state.
    ///
    /// [`unsubscribe`]: QuerySubscription::unsubscribe
    pub fn subscribe(
        &self,
        key: &str,
        callback: impl Fn(&QueryResult) + Send + Sync + 'static,
        meta: MetaUpdate,
    ) -> QuerySubscription {
        let callback: Callback = Arc::new(callback);
        let (id, snapshot) = {
            let mut state = self.state();
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state
                .subscribers
                .entry(key.to_owned())
                .or_default()
                .insert(id, callback.clone());

            let entry = state.entries.entry(key.to_owned()).or_insert_with(Entry::new);
            entry.result.meta.apply(meta);
            let snapshot = entry.result.clone();

            let stale_time = snapshot.meta.stale_time;
            self.manage_refetch(&mut state, key, stale_time);
            (id, snapshot)
        };

        callback(&snapshot);

        QuerySubscription {
            inner: Arc::downgrade(&self.inner),
            key: key.to_owned(),
            id,
            active: true,
        }
    }

    /// Installs `data` for `key` without fetching.
    ///
    /// Clears any previous error and the fetching flag, merges `meta`,
    /// notifies subscribers, and re-evaluates the refetch timer. Creates
    /// the entry if absent. Used for write-through from mutation results.
    /// An in-flight fetch for the key is superseded: its eventual outcome
    /// is discarded.
    pub fn set_query_data(&self, key: &str, data: Option<FetchSuccess>, meta: MetaUpdate) {
        let (snapshot, callbacks) = {
            let mut state = self.state();
            let entry = state.entries.entry(key.to_owned()).or_insert_with(Entry::new);
            entry.epoch += 1;
            entry.result.data = data;
            entry.result.error = None;
            entry.result.is_fetching = false;
            entry.result.meta.apply(meta);
            let snapshot = entry.result.clone();
            let callbacks = state.callbacks_for(key);

            let stale_time = snapshot.meta.stale_time;
            self.manage_refetch(&mut state, key, stale_time);
            (snapshot, callbacks)
        };

        notify(&callbacks, &snapshot);
    }

    /// Requests an immediate refetch of `key`.
    ///
    /// A key that was never subscribed or initialized cannot be invalidated
    /// blindly: the call warns and does nothing. A key that is already
    /// fetching drops the call silently, so concurrent invalidations
    /// collapse into the single in-flight fetch.
    ///
    /// The fetching flag is checked and set before the first suspension
    /// point, which is what makes the collapse race-free.
    pub fn invalidate(&self, key: &str) {
        let (snapshot, callbacks, epoch) = {
            let mut state = self.state();
            let Some(entry) = state.entries.get_mut(key) else {
                warn!(key, "ignoring invalidation for unknown query");
                return;
            };
            if entry.result.is_fetching {
                debug!(key, "invalidation dropped, fetch already in flight");
                return;
            }

            entry.epoch += 1;
            let epoch = entry.epoch;
            entry.result.is_fetching = true;
            entry.result.error = None;
            let snapshot = entry.result.clone();
            let callbacks = state.callbacks_for(key);

            let stale_time = snapshot.meta.stale_time;
            self.manage_refetch(&mut state, key, stale_time);
            (snapshot, callbacks, epoch)
        };

        notify(&callbacks, &snapshot);

        let weak = Arc::downgrade(&self.inner);
        let transport = self.inner.transport.clone();
        let key = key.to_owned();
        tokio::spawn(async move {
            let outcome = transport.fetch(&key).await;
            let Some(inner) = weak.upgrade() else { return };
            QueryCache { inner }.apply_fetch(&key, epoch, outcome);
        });
    }

    /// Records a completed fetch, unless a newer write superseded it.
    fn apply_fetch(&self, key: &str, epoch: u64, outcome: FetchResult) {
        let (snapshot, callbacks) = {
            let mut state = self.state();
            let Some(entry) = state.entries.get_mut(key) else {
                return;
            };
            if entry.epoch != epoch {
                debug!(key, "discarding superseded fetch result");
                return;
            }

            match outcome {
                Ok(data) => {
                    entry.result.data = Some(data);
                    entry.result.error = None;
                }
                // A failed refetch keeps the previously cached data.
                Err(err) => {
                    entry.result.error = Some(err.to_string());
                }
            }
            entry.result.is_fetching = false;
            let snapshot = entry.result.clone();
            let callbacks = state.callbacks_for(key);

            let stale_time = snapshot.meta.stale_time;
            self.manage_refetch(&mut state, key, stale_time);
            (snapshot, callbacks)
        };

        notify(&callbacks, &snapshot);
    }

    /// Re-arms the refetch timer for `key`.
    ///
    /// Any existing timer is cancelled first. A new one starts only when
    /// `interval` is positive and the key has at least one subscriber;
    /// each tick invalidates the key. Called after every state mutation
    /// and every subscribe/unsubscribe so the timer always matches current
    /// demand.
    fn manage_refetch(&self, state: &mut State, key: &str, interval: Duration) {
        if let Some(token) = state.timers.remove(key) {
            token.cancel();
        }

        if interval.is_zero() || !state.has_subscribers(key) {
            return;
        }

        let token = CancellationToken::new();
        state.timers.insert(key.to_owned(), token.clone());

        let weak = Arc::downgrade(&self.inner);
        let key = key.to_owned();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; polling starts one
            // full interval out.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        QueryCache { inner }.invalidate(&key);
                    }
                }
            }
        });
    }

    fn remove_subscriber(&self, key: &str, id: u64) {
        let mut state = self.state();
        let emptied = match state.subscribers.get_mut(key) {
            Some(set) => {
                set.remove(&id);
                set.is_empty()
            }
            None => false,
        };
        if emptied {
            state.subscribers.remove(key);
            // Force-stop polling; the entry itself stays.
            self.manage_refetch(&mut state, key, Duration::ZERO);
        }
    }

    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().expect("query cache state poisoned")
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            for token in state.timers.values() {
                token.cancel();
            }
        }
    }
}

/// Guard for an active subscription.
///
/// Unsubscribes when [`unsubscribe`](Self::unsubscribe) is called or when
/// the guard is dropped.
pub struct QuerySubscription {
    inner: Weak<Inner>,
    key: String,
    id: u64,
    active: bool,
}

impl QuerySubscription {
    /// Removes the subscription's callback from its key.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        QueryCache { inner }.remove_subscriber(&self.key, self.id);
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Delivers a snapshot outside the state lock, so callbacks may re-enter
/// the cache.
fn notify(callbacks: &[Callback], snapshot: &QueryResult) {
    for callback in callbacks {
        callback(snapshot);
    }
}
