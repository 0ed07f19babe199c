//! In-process session store
//!
//! One [`Conversation`] per session id, each behind its own async mutex so a
//! session never runs two turns at once while other sessions proceed.

use super::Conversation;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

pub type SharedConversation = Arc<Mutex<Conversation>>;

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SharedConversation>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing conversation for `session_id`, or a new one.
    pub async fn get_or_create(&self, session_id: Uuid) -> SharedConversation {
        if let Some(existing) = self.sessions.read().await.get(&session_id) {
            return Arc::clone(existing);
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(session_id).or_insert_with(|| {
            info!(session_id = %session_id, "Starting new conversation");
            Arc::new(Mutex::new(Conversation::new(session_id)))
        }))
    }

    pub async fn get(&self, session_id: Uuid) -> Option<SharedConversation> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    pub async fn remove(&self, session_id: Uuid) -> bool {
        self.sessions.write().await.remove(&session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Session id for a client-supplied key: a UUID is used as-is, anything else
/// maps to a stable UUID derived from its SHA-256.
pub fn session_id_from_str(input: &str) -> Uuid {
    let trimmed = input.trim();
    Uuid::parse_str(trimmed).unwrap_or_else(|_| stable_uuid_from_string(trimmed))
}

fn stable_uuid_from_string(input: &str) -> Uuid {
    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Turn;

    #[tokio::test]
    async fn test_same_id_shares_conversation() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();

        let first = store.get_or_create(id).await;
        first.lock().await.push(Turn::human("hello"));

        let second = store.get_or_create(id).await;
        assert_eq!(second.lock().await.len(), 1);
        assert_eq!(store.len().await, 1);

        store.get_or_create(Uuid::new_v4()).await;
        assert_eq!(store.len().await, 2);
        assert!(store.remove(id).await);
        assert!(store.get(id).await.is_none());
    }

    #[test]
    fn test_session_ids_are_stable() {
        let id = Uuid::new_v4();
        assert_eq!(session_id_from_str(&id.to_string()), id);
        assert_eq!(session_id_from_str("teller-7"), session_id_from_str(" teller-7 "));
        assert_ne!(session_id_from_str("teller-7"), session_id_from_str("teller-8"));
        assert_eq!(session_id_from_str("teller-7").get_version_num(), 4);
    }
}
