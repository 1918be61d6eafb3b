//! Notification records: creation on pipeline events and read/unread tracking.
//!
//! - `NotificationStore`: persistence (in-memory or durable)
//! - `NotificationEmitter`: creates notifications for terminal job transitions
//!   and other system events
//! - `NotificationInbox`: the owner-facing read side

pub mod emitter;
pub mod inbox;
pub mod store;

pub use emitter::NotificationEmitter;
pub use inbox::{DEFAULT_LIST_LIMIT, NotificationInbox};
pub use store::{InMemoryNotificationStore, NotificationStore};
