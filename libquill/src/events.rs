//! Navigation and notification collaborators
//!
//! The store never renders anything or changes views itself. It hands
//! notifications to a [`Notifier`] and redirects to a [`Navigator`].
//! [`EventBus`] implements both on top of `tokio::sync::broadcast`, so any
//! number of front-ends (a CLI printer, a TUI, a test) can subscribe.
//!
//! # Non-Blocking Behavior
//!
//! If no subscribers exist, events are dropped immediately. Subscribers can
//! lag without blocking the store.
//!
//! ```
//! use libquill::events::{Event, EventBus, Navigator};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.navigate("/");
//!
//! if let Ok(Event::Navigate { path }) = receiver.recv().await {
//!     assert_eq!(path, "/");
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<Event>;

/// Receives the target path after a successful mutation
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Shows failures to the user
pub trait Notifier: Send + Sync {
    fn notify_error(&self, title: &str, description: &str);
}

/// Events emitted by the store and its collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Redirect request
    Navigate { path: String },

    /// User-facing error report
    Notification {
        title: String,
        description: String,
    },

    /// The article list was replaced
    ArticlesLoaded { count: usize },

    /// A profile was fetched for a fresh or restored session
    SignedIn { username: String },

    /// The session was cleared
    SignedOut,
}

/// Broadcast bus for store events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before the oldest events are
    /// dropped for a lagging receiver
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Navigator for EventBus {
    fn navigate(&self, path: &str) {
        tracing::debug!(path, "Navigating");
        self.emit(Event::Navigate {
            path: path.to_string(),
        });
    }
}

impl Notifier for EventBus {
    fn notify_error(&self, title: &str, description: &str) {
        self.emit(Event::Notification {
            title: title.to_string(),
            description: description.to_string(),
        });
    }
}
