//! Conversation memory
//!
//! Append-only conversation histories and the session store that owns them
//! for the lifetime of the process.

pub mod sessions;
pub mod store;

pub use sessions::{session_id_from_str, SessionStore, SharedConversation};
pub use store::Conversation;
