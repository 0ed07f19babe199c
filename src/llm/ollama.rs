//! Ollama chat client
//!
//! Speaks the non-streaming `/api/chat` endpoint with native tool calling.
//! Ollama does not assign ids to tool calls, so every call gets a fresh one
//! here; results are correlated back by order and operation name.

use super::{ChatModel, ModelRequest, ModelResponse};
use crate::config::ModelConfig;
use crate::error::AgentError;
use crate::models::{OperationCall, ToolDefinition, Turn, TurnContent, TurnRole};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

/// Connection-pooled Ollama client.
pub struct OllamaChatModel {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaChatModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: build_messages(request.system, request.turns),
            tools: request.tools.iter().map(ChatTool::from).collect(),
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        info!(model = %self.model, tools = request.tools.len(), "Calling Ollama");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Ollama request failed: {}", e);
                AgentError::LlmError(format!("Ollama request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            error!(status, "Ollama error response: {}", error_text);
            return Err(AgentError::LlmError(format!(
                "Ollama returned {}: {}",
                status, error_text
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Ollama response: {}", e);
            AgentError::LlmError(format!("Ollama parse error: {}", e))
        })?;

        Ok(into_model_response(parsed.message))
    }
}

fn build_messages(system: &str, turns: &[Turn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(ChatMessage::plain("system", system));

    for turn in turns {
        let message = match &turn.content {
            TurnContent::Text { text } => match turn.role {
                TurnRole::Human => ChatMessage::plain("user", text),
                _ => ChatMessage::plain("assistant", text),
            },
            TurnContent::OperationCalls { calls } => ChatMessage {
                role: "assistant".to_string(),
                content: String::new(),
                tool_calls: Some(
                    calls
                        .iter()
                        .map(|call| ToolCall {
                            function: FunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect(),
                ),
                tool_name: None,
            },
            TurnContent::OperationResult {
                operation, output, ..
            } => ChatMessage {
                role: "tool".to_string(),
                content: output.to_string(),
                tool_calls: None,
                tool_name: Some(operation.clone()),
            },
        };
        messages.push(message);
    }

    messages
}

fn into_model_response(message: ChatMessage) -> ModelResponse {
    match message.tool_calls {
        Some(calls) if !calls.is_empty() => ModelResponse::Calls(
            calls
                .into_iter()
                .map(|call| {
                    OperationCall::new(call.function.name, normalize_arguments(call.function.arguments))
                })
                .collect(),
        ),
        _ => ModelResponse::Text(message.content),
    }
}

/// Some models emit arguments as a JSON-encoded string.
fn normalize_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            tool_calls: None,
            tool_name: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct ChatTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

impl<'a> From<&'a ToolDefinition> for ChatTool<'a> {
    fn from(definition: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: definition,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperationOutput;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::time::Duration;

    fn model(base_url: String) -> OllamaChatModel {
        OllamaChatModel::new(&ModelConfig {
            base_url,
            model: "llama3.1".to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn definition() -> ToolDefinition {
        ToolDefinition {
            name: "get_loan_details".to_string(),
            description: "Get a loan".to_string(),
            parameters: json!({"type": "object", "properties": {"loan_id": {"type": "integer"}}}),
        }
    }

    #[tokio::test]
    async fn test_tool_calls_are_parsed() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({
                "model": "llama3.1",
                "stream": false,
                "options": {"temperature": 0.0}
            })))
            .with_status(200)
            .with_body(
                r#"{"message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"get_loan_details","arguments":{"loan_id":7}}}]},"done":true}"#,
            )
            .create_async()
            .await;

        let turns = vec![Turn::human("status of loan 7")];
        let tools = vec![definition()];
        let response = model(server.url())
            .invoke(ModelRequest {
                system: "be brief",
                turns: &turns,
                tools: &tools,
            })
            .await
            .unwrap();

        match response {
            ModelResponse::Calls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "get_loan_details");
                assert_eq!(calls[0].arguments, json!({"loan_id": 7}));
                assert!(calls[0].call_id.starts_with("call_"));
            }
            other => panic!("expected calls, got {:?}", other),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_text_reply_and_http_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"message":{"role":"assistant","content":"Loan 7 is active."},"done":true}"#)
            .create_async()
            .await;

        let response = model(server.url())
            .invoke(ModelRequest {
                system: "",
                turns: &[],
                tools: &[],
            })
            .await
            .unwrap();
        assert_eq!(response, ModelResponse::Text("Loan 7 is active.".to_string()));

        let mut failing = Server::new_async().await;
        failing
            .mock("POST", "/api/chat")
            .with_status(404)
            .with_body(r#"{"error":"model 'llama3.1' not found"}"#)
            .create_async()
            .await;
        let result = model(failing.url())
            .invoke(ModelRequest {
                system: "",
                turns: &[],
                tools: &[],
            })
            .await;
        assert!(matches!(result, Err(AgentError::LlmError(msg)) if msg.contains("404")));
    }

    #[test]
    fn test_history_maps_to_chat_roles() {
        let call = OperationCall::new("get_loan_details", json!({"loan_id": 7}));
        let turns = vec![
            Turn::human("status of loan 7"),
            Turn::agent_calls(vec![call.clone()]),
            Turn::operation_result(&call, &OperationOutput::Success(json!({"status": "Active"}))),
            Turn::agent_text("Loan 7 is active."),
        ];
        assert_eq!(turns[0].role, TurnRole::Human);

        let messages = build_messages("system prompt", &turns);
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "assistant"]);
        assert_eq!(messages[3].tool_name.as_deref(), Some("get_loan_details"));
        assert_eq!(messages[3].content, r#"{"status":"Active"}"#);
        assert_eq!(
            messages[2].tool_calls.as_ref().unwrap()[0].function.arguments,
            json!({"loan_id": 7})
        );
    }

    #[test]
    fn test_string_arguments_are_decoded() {
        assert_eq!(normalize_arguments(json!("{\"loan_id\": 3}")), json!({"loan_id": 3}));
        assert_eq!(normalize_arguments(json!("not json")), json!("not json"));
    }
}
