//! Per-session chat state and its store.
//!
//! This module provides in-memory session storage for keeping chat state
//! across interactions. Sessions are identified by UUID and hold the
//! transcript, the accumulated file fragments, the token counter and the
//! model binding.
//!
//! # Architecture
//!
//! - [`SessionState`]: the full state of one session
//! - [`SessionStore`]: thread-safe map from session id to a locked [`SessionState`]
//!
//! # Example
//!
//! ```rust
//! use tutor_chat::session::{Lifecycle, SessionStore};
//!
//! # tokio_test_block(async {
//! let store = SessionStore::new();
//! let (id, handle) = store.create();
//! let mut session = handle.lock().await;
//! session.initialize_if_absent();
//!
//! assert_eq!(session.id(), id);
//! assert_eq!(session.lifecycle(), Lifecycle::Initialized);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
//! # }
//! ```

mod state;
mod store;

pub use state::{ChatState, Lifecycle, SessionState, Turn, TurnRole};
pub use store::{SessionHandle, SessionStore};
