//! Language-model seam
//!
//! The orchestrator only needs one capability from a model: given the system
//! prompt, the conversation so far and the operations on offer, answer with
//! either text or a batch of operation calls.

use crate::error::AgentError;
use crate::models::{OperationCall, ToolDefinition, Turn};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

pub mod ollama;
pub use ollama::OllamaChatModel;

/// Everything one model invocation sees.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: &'a str,
    pub turns: &'a [Turn],
    pub tools: &'a [ToolDefinition],
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    Text(String),
    Calls(Vec<OperationCall>),
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelResponse>;
}

/// What a [`ScriptedModel`] was shown on one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedInvocation {
    pub turn_count: usize,
    pub tool_names: Vec<String>,
}

/// Model that replays canned responses, for development and tests.
///
/// Responses are consumed in order and the last one repeats once the script
/// is down to it.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<ModelResponse>>,
    invocations: Mutex<Vec<RecordedInvocation>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelResponse> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedInvocation {
                turn_count: request.turns.len(),
                tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
            });

        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        next.ok_or_else(|| AgentError::LlmError("scripted model has no responses".to_string()))
    }
}
