//! Query snapshots and per-key metadata.

use std::time::Duration;

use crate::client::FetchSuccess;

/// Per-key cache configuration.
///
/// This controls when a key is refreshed in the background while it has
/// active subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryMeta {
    /// Interval between background refreshes.
    ///
    /// Zero (the default) disables polling entirely; any positive value
    /// re-fetches the key at that interval for as long as at least one
    /// subscriber is active.
    pub stale_time: Duration,
}

impl QueryMeta {
    /// Creates metadata with the given polling interval.
    #[must_use]
    pub const fn new(stale_time: Duration) -> Self {
        Self { stale_time }
    }

    /// Applies a partial update; fields the update leaves unset keep their
    /// current values. The latest update wins per field.
    pub(crate) fn apply(&mut self, update: MetaUpdate) {
        if let Some(stale_time) = update.stale_time {
            self.stale_time = stale_time;
        }
    }
}

/// Partial metadata supplied alongside `subscribe` or `set_query_data`.
///
/// The default update changes nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetaUpdate {
    /// New polling interval, when set.
    pub stale_time: Option<Duration>,
}

impl MetaUpdate {
    /// An update that sets only the polling interval.
    #[must_use]
    pub const fn stale_time(stale_time: Duration) -> Self {
        Self {
            stale_time: Some(stale_time),
        }
    }
}

/// Snapshot of one query's state, delivered to subscribers.
///
/// Snapshots are applied atomically: a subscriber never observes a
/// partially merged entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// Last successfully fetched payload; `None` until the first success.
    /// A failed refetch leaves the previous value in place.
    pub data: Option<FetchSuccess>,
    /// `true` exactly while a request for this key is in flight.
    pub is_fetching: bool,
    /// Last error message; cleared on every new fetch attempt and on
    /// success.
    pub error: Option<String>,
    /// Current metadata for this key.
    pub meta: QueryMeta,
}

impl QueryResult {
    /// `true` when a previously fetched payload is available.
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// `true` when the last fetch attempt failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_meta_disables_polling() {
        assert_eq!(QueryMeta::default().stale_time, Duration::ZERO);
    }

    #[test]
    fn test_apply_is_last_write_wins() {
        let mut meta = QueryMeta::new(Duration::from_secs(1));
        meta.apply(MetaUpdate::default());
        assert_eq!(meta.stale_time, Duration::from_secs(1));

        meta.apply(MetaUpdate::stale_time(Duration::from_secs(2)));
        assert_eq!(meta.stale_time, Duration::from_secs(2));
    }

    #[test]
    fn test_default_snapshot() {
        let snapshot = QueryResult::default();
        assert!(!snapshot.has_data());
        assert!(!snapshot.is_fetching);
        assert!(!snapshot.is_error());
        assert_eq!(snapshot.meta.stale_time, Duration::ZERO);
    }
}
