//! Session bookkeeping and durable message persistence.
//!
//! - [`Session`] groups a conversation: its history and the task graphs run in it.
//! - [`SessionStore`] persists sessions; [`FileSessionStore`] keeps one JSON file each.
//! - [`MessageStore`] is the append-only persistence behind the message pool;
//!   [`FileMessageStore`] writes fsynced JSONL per session.

/// Append-only persistence for pool messages.
pub mod message_store;
/// The session record.
pub mod session;
/// Session persistence.
pub mod store;

pub use message_store::{FileMessageStore, InMemoryMessageStore, MessageStore};
pub use session::Session;
pub use store::{FileSessionStore, SessionStore};
