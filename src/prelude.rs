//! Prelude module for convenient imports.
//!
//! ```
//! use ebb::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`FetchClient`] and its request/outcome types
//! - [`QueryCache`], [`QuerySubscription`], and the snapshot types
//! - [`Mutation`] for write-through submissions
//! - [`EventBus`] for typed cross-component signaling

pub use crate::client::{
    Fetch, FetchClient, FetchError, FetchParameters, FetchResult, FetchSuccess, MarkupDocument,
    Method, Payload,
};
pub use crate::events::{EventBus, EventStream};
pub use crate::query::{
    MetaUpdate, Mutation, MutationEvent, MutationOutcome, QueryCache, QueryMeta, QueryResult,
    QuerySubscription,
};
