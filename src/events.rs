//! Typed publish/subscribe channel for cross-component signaling.
//!
//! Components that need to react to each other's actions do so through an
//! [`EventBus`] constructed at the application root and passed by handle,
//! with a typed payload per bus; there is no ambient, string-named event
//! namespace. Internally the bus wraps `tokio::broadcast`; when a slow
//! subscriber falls behind the bounded buffer, it skips the gap and
//! continues with the newest events.
//!
//! # Example
//!
//! ```rust
//! use ebb::events::EventBus;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum Signal {
//!     Refreshed { key: String },
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus: EventBus<Signal> = EventBus::new();
//! let mut stream = bus.subscribe();
//!
//! bus.publish(Signal::Refreshed { key: "/users".into() });
//! assert_eq!(
//!     stream.next().await,
//!     Some(Signal::Refreshed { key: "/users".into() })
//! );
//! # }
//! ```

use tokio::sync::broadcast;
use tracing::debug;

/// Default buffer size for a bus.
const DEFAULT_CAPACITY: usize = 64;

/// A typed broadcast channel.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus<T> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Creates a bus with the default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus with the given buffer capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Returns the number of subscribers the event reached; an event
    /// published with no subscribers is dropped, which is not an error.
    pub fn publish(&self, event: T) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribes to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> EventStream<T> {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }

    /// The number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of an [`EventBus`].
pub struct EventStream<T> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> EventStream<T> {
    /// Receives the next event, or `None` once the bus is gone.
    ///
    /// A subscriber that lagged behind the buffer skips the gap and
    /// resumes with the oldest retained event.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
