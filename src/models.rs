//! Core data models for the banking agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AgentError;

//
// ================= Domains =================
//

/// Routing group an operation belongs to. The set is closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Clients,
    Loans,
    Savings,
}

impl Domain {
    /// Every domain, in routing order.
    pub const ALL: [Domain; 3] = [Domain::Clients, Domain::Loans, Domain::Savings];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Clients => "clients",
            Domain::Loans => "loans",
            Domain::Savings => "savings",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clients" => Ok(Domain::Clients),
            "loans" => Ok(Domain::Loans),
            "savings" => Ok(Domain::Savings),
            other => Err(AgentError::InvalidRouting(format!(
                "unknown domain `{}` (expected clients|loans|savings)",
                other
            ))),
        }
    }
}

//
// ================= Operation I/O =================
//

/// A call the model asked for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

impl OperationCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No response was received from the backend.
    Transport,
    /// The backend answered with a non-success status.
    Rejected { status: u16 },
    /// Arguments did not match the operation's schema.
    InvalidInput,
    /// The named operation is unknown or was not offered to the model.
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Uniform result of running an operation.
///
/// Failures travel as values; `to_value` renders them with the
/// `{"error": message}` shape that the model and the HTTP adapters inspect.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    Success(Value),
    Failure(OperationFailure),
}

impl OperationOutput {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        OperationOutput::Failure(OperationFailure {
            kind,
            message: message.into(),
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OperationOutput::Failure(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            OperationOutput::Success(_) => None,
            OperationOutput::Failure(failure) => Some(failure.message.as_str()),
        }
    }

    /// Apply `f` to a successful payload, leaving failures untouched.
    pub fn map_success(self, f: impl FnOnce(Value) -> Value) -> Self {
        match self {
            OperationOutput::Success(data) => OperationOutput::Success(f(data)),
            failure => failure,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            OperationOutput::Success(data) => data.clone(),
            OperationOutput::Failure(failure) => json!({ "error": failure.message }),
        }
    }
}

impl From<OperationOutput> for Value {
    fn from(output: OperationOutput) -> Self {
        match output {
            OperationOutput::Success(data) => data,
            OperationOutput::Failure(failure) => json!({ "error": failure.message }),
        }
    }
}

/// Function definition handed to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the parameters.
    pub parameters: Value,
}

//
// ================= Turns =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Human,
    Agent,
    OperationResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnContent {
    Text {
        text: String,
    },
    OperationCalls {
        calls: Vec<OperationCall>,
    },
    OperationResult {
        call_id: String,
        operation: String,
        output: Value,
        is_error: bool,
    },
}

/// One entry of conversation history. Never mutated once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub turn_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub role: TurnRole,
    pub content: TurnContent,
}

impl Turn {
    fn new(role: TurnRole, content: TurnContent) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            created_at: Utc::now(),
            role,
            content,
        }
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self::new(TurnRole::Human, TurnContent::Text { text: text.into() })
    }

    pub fn agent_text(text: impl Into<String>) -> Self {
        Self::new(TurnRole::Agent, TurnContent::Text { text: text.into() })
    }

    pub fn agent_calls(calls: Vec<OperationCall>) -> Self {
        Self::new(TurnRole::Agent, TurnContent::OperationCalls { calls })
    }

    pub fn operation_result(call: &OperationCall, output: &OperationOutput) -> Self {
        Self::new(
            TurnRole::OperationResult,
            TurnContent::OperationResult {
                call_id: call.call_id.clone(),
                operation: call.name.clone(),
                output: output.to_value(),
                is_error: output.is_error(),
            },
        )
    }

    /// Text of a human or agent text turn.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text { text } => Some(text.as_str()),
            _ => None,
        }
    }
}
