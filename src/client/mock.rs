//! Scripted transport for testing.
//!
//! [`MockTransport`] implements [`Fetch`] with a queue of scripted
//! outcomes, enabling deterministic tests of cache behavior without real
//! I/O. It is designed to be shared between the cache under test and the
//! test code: clone it, hand one copy to [`QueryCache::new`], and keep the
//! other to script outcomes and inspect calls.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ebb::client::mock::MockTransport;
//! use ebb::client::{FetchSuccess, Payload};
//! use ebb::query::QueryCache;
//!
//! let transport = MockTransport::new();
//! transport.enqueue(Ok(FetchSuccess::Data(Payload::from_message("ok"))));
//!
//! let cache = QueryCache::new(Arc::new(transport.clone()));
//! // ... drive the cache, then:
//! assert_eq!(transport.calls(), 0);
//! ```
//!
//! An empty script answers with the default "no content" success value.
//! [`MockTransport::enqueue_delayed`] parks a response on the tokio clock
//! first, which pairs with `start_paused` tests to hold a fetch in flight
//! for exactly as long as the test wants.
//!
//! [`QueryCache::new`]: crate::query::QueryCache::new

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{Fetch, FetchResult, FetchSuccess};

/// A [`Fetch`] implementation that answers from a scripted queue.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Scripted>>,
    requested: Mutex<Vec<String>>,
}

struct Scripted {
    delay: Option<Duration>,
    outcome: FetchResult,
}

impl MockTransport {
    /// Creates a transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an outcome to the script.
    ///
    /// # Panics
    ///
    /// Panics if the script mutex is poisoned.
    pub fn enqueue(&self, outcome: FetchResult) {
        self.inner
            .script
            .lock()
            .expect("mock script mutex poisoned")
            .push_back(Scripted {
                delay: None,
                outcome,
            });
    }

    /// Appends an outcome that resolves only after `delay` on the tokio
    /// clock, keeping the fetch in flight until then.
    ///
    /// # Panics
    ///
    /// Panics if the script mutex is poisoned.
    pub fn enqueue_delayed(&self, delay: Duration, outcome: FetchResult) {
        self.inner
            .script
            .lock()
            .expect("mock script mutex poisoned")
            .push_back(Scripted {
                delay: Some(delay),
                outcome,
            });
    }

    /// How many times [`Fetch::fetch`] was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// The keys requested so far, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the request-log mutex is poisoned.
    #[must_use]
    pub fn requested_keys(&self) -> Vec<String> {
        self.inner
            .requested
            .lock()
            .expect("mock request log mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl Fetch for MockTransport {
    async fn fetch(&self, key: &str) -> FetchResult {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .requested
            .lock()
            .expect("mock request log mutex poisoned")
            .push(key.to_owned());

        let scripted = self
            .inner
            .script
            .lock()
            .expect("mock script mutex poisoned")
            .pop_front();

        match scripted {
            Some(Scripted {
                delay: Some(delay),
                outcome,
            }) => {
                tokio::time::sleep(delay).await;
                outcome
            }
            Some(Scripted { outcome, .. }) => outcome,
            None => Ok(FetchSuccess::no_content()),
        }
    }
}
