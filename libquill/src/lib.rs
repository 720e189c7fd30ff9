//! Quill - session and article store for a blogging client
//!
//! This library holds the client-side state of a small blogging front-end:
//! the article list and the signed-in session. It drives the sign-in,
//! sign-out and article flows against the blog's HTTP API and reports
//! failures through pluggable navigation and notification collaborators.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{QuillError, Result};
pub use events::{Event, EventBus};
pub use store::{Store, StoreBuilder, StoreState};
pub use types::{Article, UserProfile};
