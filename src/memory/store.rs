//! Conversation history storage
//!
//! Append-only list of turns for one session.

use crate::models::{Turn, TurnContent, TurnRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conversation state for one session. Turns are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Iterate over recent turns (N most recent, newest first)
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &Turn> {
        self.turns.iter().rev().take(count)
    }

    /// Readable transcript, one line per turn.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            let line = match (&turn.role, &turn.content) {
                (TurnRole::Human, TurnContent::Text { text }) => format!("Teller: {}", text),
                (_, TurnContent::Text { text }) => format!("Agent: {}", text),
                (_, TurnContent::OperationCalls { calls }) => {
                    let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
                    format!("Agent -> {}", names.join(", "))
                }
                (_, TurnContent::OperationResult { operation, output, .. }) => {
                    format!("  {} = {}", operation, output)
                }
            };
            out.push_str(&format!("[{}] {}\n", turn.created_at.format("%H:%M:%S"), line));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OperationCall, OperationOutput};
    use serde_json::json;

    #[test]
    fn test_append_and_transcript() {
        let mut conversation = Conversation::new(Uuid::new_v4());
        assert!(conversation.is_empty());

        let call = OperationCall::new("get_savings_account", json!({"account_id": 3}));
        conversation.push(Turn::human("balance of account 3?"));
        conversation.push(Turn::agent_calls(vec![call.clone()]));
        conversation.push(Turn::operation_result(
            &call,
            &OperationOutput::Success(json!({"accountBalance": 120.5})),
        ));
        conversation.push(Turn::agent_text("Account 3 holds 120.50."));

        assert_eq!(conversation.len(), 4);
        assert_eq!(
            conversation.recent(1).next().and_then(Turn::text),
            Some("Account 3 holds 120.50.")
        );

        let transcript = conversation.transcript();
        assert!(transcript.contains("Teller: balance of account 3?"));
        assert!(transcript.contains("Agent -> get_savings_account"));
        assert!(transcript.contains(r#"get_savings_account = {"accountBalance":120.5}"#));
    }
}
