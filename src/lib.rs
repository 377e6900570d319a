//! # Ebb - Observable Request Cache
//!
//! Ebb is the data layer for ajax-driven components: an HTTP transport
//! that classifies request outcomes, a query cache that owns per-key
//! state, and a subscription registry that derives background polling
//! from subscriber demand.
//!
//! ## Architecture
//!
//! Data flows through three layers:
//!
//! 1. **Transport** ([`client`]): performs one request and produces
//!    exactly one of failure or success, never an exception
//! 2. **Cache Store** ([`query`]): the single source of truth per query
//!    key (data, fetching flag, last error, metadata)
//! 3. **Subscriptions** ([`query::QueryCache::subscribe`]): observers
//!    notified with complete snapshots on every change; the last
//!    unsubscribe of a key stops its polling
//!
//! Cross-component signaling goes through a typed [`events::EventBus`]
//! constructed at the application root.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use ebb::client::FetchClient;
//! use ebb::query::{MetaUpdate, QueryCache};
//!
//! # fn run() -> Result<(), ebb::client::FetchError> {
//! let client = Arc::new(FetchClient::new()?);
//! let cache = QueryCache::new(client);
//!
//! let subscription = cache.subscribe(
//!     "/api/notifications",
//!     |snapshot| {
//!         if let Some(data) = &snapshot.data {
//!             // re-render from the new data
//!         }
//!     },
//!     MetaUpdate::stale_time(Duration::from_secs(60)),
//! );
//!
//! cache.invalidate("/api/notifications");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod events;
pub mod prelude;
pub mod query;
