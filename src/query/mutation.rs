//! Write-through submissions for form-style mutations.
//!
//! A [`Mutation`] performs one non-cached request (typically POST, PUT,
//! PATCH, or DELETE) and reconciles the cache with the outcome. Unlike
//! queries, mutations are one-off operations: they never store their own
//! result under a key, they push it into queries that already exist.
//!
//! Reconciliation follows the response shape:
//!
//! - A markup document is written through to the caller's `write_key`
//!   directly, with no refetch.
//! - A structured payload triggers a refetch of the follow-up
//!   [`query_key`](crate::client::Payload::query_key) the server named, if
//!   any, and then of the caller's `write_key`; its `message` and
//!   `redirect_url` are surfaced in the [`MutationOutcome`] for the
//!   consumer to render or navigate.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ebb::client::{FetchClient, FetchParameters, Method};
//! use ebb::query::{Mutation, QueryCache};
//!
//! # async fn run() -> Result<(), ebb::client::FetchError> {
//! let client = Arc::new(FetchClient::new()?);
//! let cache = QueryCache::new(client.clone());
//! let mutation = Mutation::new(client, cache);
//!
//! let parameters = FetchParameters {
//!     data: Some("name=tea".to_owned()),
//!     ..FetchParameters::default()
//! };
//! let outcome = mutation
//!     .submit("/api/items", Method::Post, parameters, Some("/api/items"))
//!     .await?;
//! println!("{:?}", outcome.message);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::client::{FetchClient, FetchError, FetchParameters, FetchSuccess, Method};
use crate::events::EventBus;

use super::cache::QueryCache;
use super::entry::MetaUpdate;

/// Event published after a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    /// The submitted address.
    pub url: String,
    /// Server-supplied message, when the response carried one.
    pub message: Option<String>,
}

/// What a successful mutation produced for the consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Server-supplied message to render.
    pub message: Option<String>,
    /// Address the consumer should navigate to; navigation itself is the
    /// consumer's concern.
    pub redirect_url: Option<String>,
}

/// Submits requests and reconciles the cache with their results.
pub struct Mutation {
    client: Arc<FetchClient>,
    cache: QueryCache,
    events: Option<EventBus<MutationEvent>>,
}

impl Mutation {
    /// Creates a mutation helper over the given transport and cache.
    #[must_use]
    pub fn new(client: Arc<FetchClient>, cache: QueryCache) -> Self {
        Self {
            client,
            cache,
            events: None,
        }
    }

    /// Publishes a [`MutationEvent`] on `events` after each successful
    /// structured-response submission.
    #[must_use]
    pub fn with_events(mut self, events: EventBus<MutationEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Performs the request and applies its result to the cache.
    ///
    /// `write_key` is the query the submitting component displays: a
    /// document response is written through to it, a structured response
    /// invalidates it.
    ///
    /// # Errors
    ///
    /// Returns the transport failure unchanged; the cache is not touched
    /// on failure.
    pub async fn submit(
        &self,
        url: &str,
        method: Method,
        parameters: FetchParameters,
        write_key: Option<&str>,
    ) -> Result<MutationOutcome, FetchError> {
        let success = self.client.send(url, method, parameters).await?;

        let payload = match success {
            FetchSuccess::Document(_) => {
                // Fresh markup replaces the displayed query wholesale; a
                // refetch would only fetch what we already hold.
                if let Some(key) = write_key {
                    debug!(url, key, "writing mutation response through");
                    self.cache
                        .set_query_data(key, Some(success), MetaUpdate::default());
                }
                return Ok(MutationOutcome::default());
            }
            FetchSuccess::Data(payload) => payload,
        };

        if let Some(key) = &payload.query_key {
            self.cache.invalidate(key);
        }
        if let Some(key) = write_key {
            self.cache.invalidate(key);
        }

        let outcome = MutationOutcome {
            message: payload.message,
            redirect_url: payload.redirect_url,
        };

        if let Some(events) = &self.events {
            events.publish(MutationEvent {
                url: url.to_owned(),
                message: outcome.message.clone(),
            });
        }

        Ok(outcome)
    }
}
