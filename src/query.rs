//! Query cache, subscriptions, and write-through mutations.
//!
//! This module is the stateful half of the crate: [`QueryCache`] owns the
//! per-key state, [`QuerySubscription`] ties observer lifetimes to it, and
//! [`Mutation`] reconciles the cache with the results of form-style
//! submissions.
//!
//! # Features
//!
//! - **Subscriptions**: callback-based observation of per-key state with
//!   synchronous initial delivery
//! - **Staleness**: per-key polling intervals, active only while a key has
//!   subscribers
//! - **Write-through**: installing mutation results without a refetch

mod cache;
mod entry;
pub mod mutation;

pub use cache::{QueryCache, QuerySubscription};
pub use entry::{MetaUpdate, QueryMeta, QueryResult};
pub use mutation::{Mutation, MutationEvent, MutationOutcome};
