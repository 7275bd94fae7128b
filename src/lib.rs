//! laundry-notify: notification delivery client library.
//!
//! Keeps a logged-in session's notification list and unread count in sync
//! with the backend: WebSocket push first, HTTP polling when push is
//! unavailable.

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod models;
pub mod notification;
pub mod session;
pub mod transport;

pub use errors::{NotifyError, Result};
pub use session::{NotificationSession, SessionEvent, SessionSnapshot};
