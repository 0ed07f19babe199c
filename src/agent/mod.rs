//! Conversation orchestrator - implements the per-turn loop
//!
//! HUMAN → ROUTE → INVOKE MODEL → EXECUTE CALLS → INVOKE MODEL … → REPLY
//!
//! The first model invocation of a turn only sees the routed operations.
//! Once any operation result is in the history the whole catalog is offered,
//! so the model can chain across domains (look up a client, then open a
//! savings account for them).

use crate::catalog::{OperationCatalog, OperationContext};
use crate::config::{AgentConfig, AppConfig};
use crate::error::AgentError;
use crate::gateway::{BankingBackend, FineractGateway};
use crate::llm::{ChatModel, ModelRequest, ModelResponse, OllamaChatModel};
use crate::memory::Conversation;
use crate::models::{FailureKind, OperationCall, OperationOutput, Turn};
use crate::router::{IntentRouter, KeywordTable, RoutingResult};
use crate::Result;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SYSTEM_PROMPT: &str = r#"You are a helpful Banking Assistant for Mifos X, working alongside a bank teller.

RULES:
1. FUNCTION CALL ONLY: to read or change anything in the bank, call one of the provided functions. Never describe a call instead of making it.
2. NO HALLUCINATIONS: never invent client, loan, savings or group IDs. If an ID is unknown, search for it or ask the teller.
3. ONLY REPORT FACTS: answer from function results only. If a result contains an "error" field, report that error plainly and suggest the next step."#;

/// Result of one human turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub routing: RoutingResult,
    pub model_invocations: u32,
}

pub struct Orchestrator {
    router: Arc<IntentRouter>,
    model: Arc<dyn ChatModel>,
    backend: Arc<dyn BankingBackend>,
    config: AgentConfig,
    /// Fixed business date; today's local date when unset.
    business_date: Option<NaiveDate>,
}

impl Orchestrator {
    pub fn new(
        router: Arc<IntentRouter>,
        model: Arc<dyn ChatModel>,
        backend: Arc<dyn BankingBackend>,
        config: AgentConfig,
    ) -> Self {
        Self {
            router,
            model,
            backend,
            config,
            business_date: None,
        }
    }

    /// Wire the banking catalog, the Fineract gateway and the Ollama model.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let catalog = Arc::new(OperationCatalog::banking()?);
        let router = Arc::new(IntentRouter::new(catalog, KeywordTable::default()));
        let backend = Arc::new(FineractGateway::new(&config.backend)?);
        let model = Arc::new(OllamaChatModel::new(&config.model)?);

        info!(
            backend = %config.backend.base_url,
            model = %config.model.model,
            max_model_invocations = config.agent.max_model_invocations,
            "Orchestrator configured"
        );

        Ok(Self::new(router, model, backend, config.agent.clone()))
    }

    pub fn with_business_date(mut self, date: NaiveDate) -> Self {
        self.business_date = Some(date);
        self
    }

    pub fn router(&self) -> &IntentRouter {
        &self.router
    }

    pub fn catalog(&self) -> &OperationCatalog {
        self.router.catalog()
    }

    pub fn route(&self, utterance: &str) -> RoutingResult {
        self.router.route(utterance)
    }

    fn context(&self) -> OperationContext<'_> {
        match self.business_date {
            Some(date) => OperationContext::with_date(self.backend.as_ref(), date),
            None => OperationContext::new(self.backend.as_ref()),
        }
    }

    /// Run an operation directly, bypassing routing and the model.
    pub async fn execute_operation(&self, name: &str, arguments: &Value) -> Result<OperationOutput> {
        self.catalog()
            .execute(name, arguments, &self.context())
            .await
    }

    /// Handle one human turn, appending every turn it produces to
    /// `conversation`.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        utterance: &str,
    ) -> Result<TurnOutcome> {
        let session_id = conversation.session_id;
        conversation.push(Turn::human(utterance));

        let routing = self.router.route(utterance);
        info!(
            session_id = %session_id,
            domains = ?routing.domains,
            tools = routing.operations.len(),
            fallback = routing.fallback,
            "Routed human turn"
        );

        let routed_tools = OperationCatalog::definitions(&routing.operations);
        let all_tools = OperationCatalog::definitions(self.catalog().all_operations());

        let max = self.config.max_model_invocations;
        let mut invocations = 0u32;
        let mut first_invocation = true;

        loop {
            if invocations >= max {
                warn!(session_id = %session_id, max, "Model kept calling operations");
                return Err(AgentError::PlanTooLong(max));
            }

            let tools = if first_invocation {
                &routed_tools
            } else {
                &all_tools
            };

            invocations += 1;
            debug!(session_id = %session_id, invocation = invocations, tools = tools.len(), "Invoking model");

            let response = self
                .model
                .invoke(ModelRequest {
                    system: SYSTEM_PROMPT,
                    turns: conversation.turns(),
                    tools,
                })
                .await?;

            let calls = match response {
                ModelResponse::Text(reply) => {
                    conversation.push(Turn::agent_text(reply.clone()));
                    info!(session_id = %session_id, model_invocations = invocations, "Turn complete");
                    return Ok(TurnOutcome {
                        reply,
                        routing,
                        model_invocations: invocations,
                    });
                }
                ModelResponse::Calls(calls) => calls,
            };

            conversation.push(Turn::agent_calls(calls.clone()));

            for call in &calls {
                let exposed = if first_invocation {
                    routing.exposes(&call.name)
                } else {
                    self.catalog().contains(&call.name)
                };

                let output = if exposed {
                    self.execute_call(call).await
                } else {
                    self.unavailable(call)
                };

                conversation.push(Turn::operation_result(call, &output));
            }

            first_invocation = false;
        }
    }

    async fn execute_call(&self, call: &OperationCall) -> OperationOutput {
        info!(operation = %call.name, call_id = %call.call_id, "Executing operation");

        match self.execute_operation(&call.name, &call.arguments).await {
            Ok(output) => {
                if let Some(message) = output.error_message() {
                    warn!(operation = %call.name, error = %message, "Operation failed");
                }
                output
            }
            Err(AgentError::InvalidToolInput(message)) => {
                warn!(operation = %call.name, error = %message, "Invalid operation arguments");
                OperationOutput::failure(FailureKind::InvalidInput, message)
            }
            Err(e) => OperationOutput::failure(FailureKind::Unavailable, e.to_string()),
        }
    }

    fn unavailable(&self, call: &OperationCall) -> OperationOutput {
        let reason = if self.catalog().contains(&call.name) {
            AgentError::OperationNotExposed(call.name.clone())
        } else {
            AgentError::ToolNotFound(call.name.clone())
        };
        let message = reason.to_string();
        warn!(operation = %call.name, "{}", message);
        OperationOutput::failure(FailureKind::Unavailable, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::StubBackend;
    use crate::llm::ScriptedModel;
    use crate::models::{TurnContent, TurnRole};
    use serde_json::json;
    use uuid::Uuid;

    struct Harness {
        orchestrator: Orchestrator,
        model: Arc<ScriptedModel>,
        backend: Arc<StubBackend>,
    }

    fn harness(script: Vec<ModelResponse>, backend: StubBackend, max: u32) -> Harness {
        let catalog = Arc::new(OperationCatalog::banking().unwrap());
        let router = Arc::new(IntentRouter::new(catalog, KeywordTable::default()));
        let model = Arc::new(ScriptedModel::new(script));
        let backend = Arc::new(backend);
        let orchestrator = Orchestrator::new(
            router,
            model.clone(),
            backend.clone(),
            AgentConfig {
                max_model_invocations: max,
            },
        )
        .with_business_date(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());

        Harness {
            orchestrator,
            model,
            backend,
        }
    }

    fn call(name: &str, arguments: Value) -> ModelResponse {
        ModelResponse::Calls(vec![OperationCall::new(name, arguments)])
    }

    fn text(reply: &str) -> ModelResponse {
        ModelResponse::Text(reply.to_string())
    }

    #[tokio::test]
    async fn test_single_call_then_summary() {
        let backend = StubBackend::new().respond(
            "GET",
            "loans/500",
            OperationOutput::Success(json!({"id": 500, "status": {"value": "Active"}})),
        );
        let h = harness(
            vec![
                call("get_loan_details", json!({"loan_id": 500})),
                text("Loan 500 is active."),
            ],
            backend,
            10,
        );
        let mut conversation = Conversation::new(Uuid::new_v4());

        let outcome = h
            .orchestrator
            .run_turn(&mut conversation, "What is the status of loan 500?")
            .await
            .unwrap();

        assert_eq!(outcome.reply, "Loan 500 is active.");
        assert_eq!(outcome.model_invocations, 2);
        assert_eq!(conversation.len(), 4);

        let roles: Vec<TurnRole> = conversation.turns().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![
                TurnRole::Human,
                TurnRole::Agent,
                TurnRole::OperationResult,
                TurnRole::Agent
            ]
        );
        match &conversation.turns()[2].content {
            TurnContent::OperationResult { output, is_error, .. } => {
                assert!(!is_error);
                assert_eq!(output["id"], 500);
            }
            other => panic!("unexpected content {:?}", other),
        }
        assert_eq!(h.backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_first_invocation_sees_routed_tools_then_full_catalog() {
        let h = harness(
            vec![
                call("get_loan_details", json!({"loan_id": 1})),
                text("done"),
            ],
            StubBackend::new(),
            10,
        );
        let mut conversation = Conversation::new(Uuid::new_v4());

        h.orchestrator
            .run_turn(&mut conversation, "Show me the repayment schedule for loan 1")
            .await
            .unwrap();

        let invocations = h.model.invocations();
        let loans = h.orchestrator.catalog().list_domain(crate::models::Domain::Loans).len();
        assert_eq!(invocations[0].tool_names.len(), loans);
        assert!(invocations[0]
            .tool_names
            .contains(&"get_repayment_schedule".to_string()));
        assert_eq!(invocations[1].tool_names.len(), h.orchestrator.catalog().len());
        assert_eq!(invocations[0].turn_count, 1);
        assert_eq!(invocations[1].turn_count, 3);
    }

    #[tokio::test]
    async fn test_unexposed_call_is_rejected_on_first_invocation() {
        let h = harness(
            vec![
                call("deposit_savings", json!({"account_id": 3, "amount": 50})),
                text("I could not do that."),
            ],
            StubBackend::new(),
            10,
        );
        let mut conversation = Conversation::new(Uuid::new_v4());

        let outcome = h
            .orchestrator
            .run_turn(&mut conversation, "approve loan 12")
            .await
            .unwrap();

        assert_eq!(outcome.model_invocations, 2);
        assert!(h.backend.calls().is_empty());
        match &conversation.turns()[2].content {
            TurnContent::OperationResult { output, is_error, .. } => {
                assert!(is_error);
                assert!(output["error"]
                    .as_str()
                    .unwrap()
                    .contains("not exposed"));
            }
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cross_domain_call_allowed_after_first_result() {
        let h = harness(
            vec![
                call("search_clients_by_name", json!({"name_query": "Maria"})),
                call("create_savings_account", json!({"client_id": 42})),
                text("Opened a savings account for Maria."),
            ],
            StubBackend::new(),
            10,
        );
        let mut conversation = Conversation::new(Uuid::new_v4());

        let outcome = h
            .orchestrator
            .run_turn(&mut conversation, "find the customer Maria")
            .await
            .unwrap();

        assert_eq!(outcome.routing.domains, vec![crate::models::Domain::Clients]);
        assert_eq!(outcome.model_invocations, 3);
        let calls = h.backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].path, "savingsaccounts");
        assert_eq!(calls[1].body.as_ref().unwrap()["submittedOnDate"], "16 October 2026");
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_calls_become_error_results() {
        let h = harness(
            vec![
                ModelResponse::Calls(vec![
                    OperationCall::new("transfer_funds", json!({})),
                    OperationCall::new("get_loan_details", json!({"loan_id": "abc"})),
                    OperationCall::new("get_loan_details", json!({"loan_id": 5})),
                ]),
                text("Partial results."),
            ],
            StubBackend::new(),
            10,
        );
        let mut conversation = Conversation::new(Uuid::new_v4());

        h.orchestrator
            .run_turn(&mut conversation, "loan 5 please")
            .await
            .unwrap();

        let results: Vec<(bool, Value)> = conversation
            .turns()
            .iter()
            .filter_map(|t| match &t.content {
                TurnContent::OperationResult { output, is_error, .. } => {
                    Some((*is_error, output.clone()))
                }
                _ => None,
            })
            .collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].0);
        assert_eq!(results[0].1["error"], "Tool not found: transfer_funds");
        assert!(results[1].0);
        assert!(results[1].1["error"].as_str().unwrap().contains("loan_id"));
        assert!(!results[2].0);
        assert_eq!(h.backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_is_fed_back_to_model() {
        let backend = StubBackend::new().respond(
            "POST",
            "savingsaccounts/3/transactions",
            OperationOutput::failure(
                FailureKind::Rejected { status: 400 },
                "Validation Error: Insufficient balance",
            ),
        );
        let h = harness(
            vec![
                call("withdraw_savings", json!({"account_id": 3, "amount": 900})),
                text("The withdrawal failed: insufficient balance."),
            ],
            backend,
            10,
        );
        let mut conversation = Conversation::new(Uuid::new_v4());

        let outcome = h
            .orchestrator
            .run_turn(&mut conversation, "withdraw 900 from account 3")
            .await
            .unwrap();

        assert_eq!(outcome.model_invocations, 2);
        match &conversation.turns()[2].content {
            TurnContent::OperationResult { output, .. } => {
                assert_eq!(output, &json!({"error": "Validation Error: Insufficient balance"}));
            }
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_endless_calls_hit_the_invocation_bound() {
        let h = harness(
            vec![call("get_loan_details", json!({"loan_id": 1}))],
            StubBackend::new(),
            3,
        );
        let mut conversation = Conversation::new(Uuid::new_v4());

        let result = h
            .orchestrator
            .run_turn(&mut conversation, "check loan 1")
            .await;

        assert!(matches!(result, Err(AgentError::PlanTooLong(3))));
        assert_eq!(h.model.invocations().len(), 3);
        // Human turn plus three call/result pairs stay in history.
        assert_eq!(conversation.len(), 7);
    }

    #[tokio::test]
    async fn test_model_failure_ends_turn() {
        let h = harness(Vec::new(), StubBackend::new(), 10);
        let mut conversation = Conversation::new(Uuid::new_v4());
        let result = h.orchestrator.run_turn(&mut conversation, "hello").await;
        assert!(matches!(result, Err(AgentError::LlmError(_))));
        assert_eq!(conversation.len(), 1);
    }
}
