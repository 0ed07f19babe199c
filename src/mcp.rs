//! Model Context Protocol server
//!
//! Publishes every catalog operation as an MCP tool so external agents can
//! drive the banking core directly. Calls skip routing and the model and go
//! straight through [`Orchestrator::execute_operation`].

use rmcp::{
    handler::server::ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
    transport::stdio,
    ErrorData as McpError, RoleServer, ServiceExt,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::error::AgentError;
use crate::models::OperationOutput;

pub const SERVER_NAME: &str = "mifos-banking-agent";

#[derive(Clone)]
pub struct BankingMcpServer {
    orchestrator: Arc<Orchestrator>,
}

impl BankingMcpServer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// One tool per catalog operation, in registration order.
    pub fn tools(&self) -> Vec<Tool> {
        self.orchestrator
            .catalog()
            .all_operations()
            .iter()
            .map(|op| {
                let definition = op.definition();
                let schema = match definition.parameters {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                Tool::new(definition.name, definition.description, schema)
            })
            .collect()
    }

    /// Run the named operation. Backend failures come back as tool errors
    /// carrying `{"error": ...}`; unknown tools and bad arguments are
    /// protocol errors.
    pub async fn dispatch(&self, request: CallToolRequestParam) -> Result<CallToolResult, McpError> {
        let arguments = Value::Object(request.arguments.unwrap_or_default());
        info!(tool = %request.name, "MCP tool call");

        match self
            .orchestrator
            .execute_operation(&request.name, &arguments)
            .await
        {
            Ok(output @ OperationOutput::Success(_)) => Ok(CallToolResult::success(vec![
                Content::text(output.to_value().to_string()),
            ])),
            Ok(output) => {
                warn!(tool = %request.name, error = ?output.error_message(), "MCP tool failed");
                Ok(CallToolResult::error(vec![Content::text(
                    output.to_value().to_string(),
                )]))
            }
            Err(e @ (AgentError::ToolNotFound(_) | AgentError::InvalidToolInput(_))) => {
                Err(McpError::invalid_params(e.to_string(), None))
            }
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Serve on stdin/stdout until the client disconnects.
    pub async fn run_stdio(self) -> std::result::Result<(), Box<dyn std::error::Error>> {
        info!(tools = self.orchestrator.catalog().len(), "Starting MCP server on stdio");

        let service = self.serve(stdio()).await?;
        service.waiting().await?;

        info!("MCP server stopped");
        Ok(())
    }
}

impl ServerHandler for BankingMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            instructions: Some(
                "Mifos X banking operations: clients, groups, loans and savings accounts. \
                 Look up IDs with search_clients_by_name before acting on a client."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch(request).await
    }
}
