//! Backend gateway to the Fineract banking core
//!
//! Every operation ends up here as one or more [`BackendCall`]s. The gateway
//! never returns a Rust error for backend trouble: transport failures and
//! rejections come back as [`OperationOutput::Failure`] values.

use crate::config::BackendConfig;
use crate::models::{FailureKind, OperationOutput};
use crate::Result;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

mod stub;
pub use stub::StubBackend;

/// Header Fineract uses to pick the tenant database.
pub const TENANT_HEADER: &str = "Fineract-Platform-TenantId";

/// One request against the banking core, relative to its API root.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendCall {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl BackendCall {
    fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path, Some(body))
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path, Some(body))
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Fineract `?command=` actions.
    pub fn command(self, command: &str) -> Self {
        self.with_query("command", command)
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Anything that can carry a [`BackendCall`] to a banking core.
#[async_trait::async_trait]
pub trait BankingBackend: Send + Sync {
    async fn send(&self, call: &BackendCall) -> OperationOutput;
}

/// HTTP gateway to a Fineract tenant. Stateless apart from the pooled client.
pub struct FineractGateway {
    client: Client,
    base_url: String,
    tenant_id: String,
    username: String,
    password: String,
}

impl FineractGateway {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tenant_id: config.tenant_id.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait::async_trait]
impl BankingBackend for FineractGateway {
    async fn send(&self, call: &BackendCall) -> OperationOutput {
        let url = self.url(&call.path);
        info!(method = %call.method, url = %url, "Executing backend call");
        if let Some(body) = &call.body {
            debug!(payload = %body, "Backend payload");
        }

        let mut request = self
            .client
            .request(call.method.clone(), &url)
            .header(TENANT_HEADER, &self.tenant_id)
            .basic_auth(&self.username, Some(&self.password));

        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Backend unreachable");
                return OperationOutput::failure(
                    FailureKind::Transport,
                    format!("Connection failed: {}", e),
                );
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(url = %url, error = %e, "Backend response body unreadable");
                return OperationOutput::failure(
                    FailureKind::Transport,
                    format!("Connection failed: {}", e),
                );
            }
        };

        if !status.is_success() {
            let message = describe_rejection(status.as_u16(), &text);
            warn!(url = %url, status = status.as_u16(), message = %message, "Backend rejected call");
            return OperationOutput::failure(
                FailureKind::Rejected {
                    status: status.as_u16(),
                },
                message,
            );
        }

        if text.trim().is_empty() {
            return OperationOutput::Success(json!({}));
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => OperationOutput::Success(body),
            Err(e) => OperationOutput::failure(
                FailureKind::Rejected {
                    status: status.as_u16(),
                },
                format!("Invalid JSON response: {}", e),
            ),
        }
    }
}

/// Human-readable message for a non-success backend response.
///
/// Fineract puts the useful text in `developerMessage` or in the first entry
/// of `errors`; anything else falls back to the status code.
pub fn describe_rejection(status: u16, body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return format!("HTTP {}: Failed to parse error response.", status);
    };

    if let Some(developer_message) = parsed.get("developerMessage") {
        let text = developer_message
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| developer_message.to_string());
        return format!("Fineract Error: {}", text);
    }

    if let Some(first) = parsed
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
    {
        let text = first
            .get("defaultUserMessage")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return format!("Validation Error: {}", text);
    }

    format!("Error {}: {}", status, body)
}
