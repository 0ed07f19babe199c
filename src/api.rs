//! REST API server for the banking agent
//!
//! Exposes the conversational agent, the intent router and every catalog
//! operation over HTTP. The per-domain endpoints bypass routing and the model
//! and run one operation directly.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::agent::Orchestrator;
use crate::error::AgentError;
use crate::memory::{session_id_from_str, Conversation, SessionStore};
use crate::models::OperationOutput;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct IntentRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntentResponse {
    pub status: String,
    pub domains: Vec<String>,
    pub tools_loaded: Vec<String>,
    pub fallback: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub session_id: String,
    pub tools_loaded: Vec<String>,
    pub model_invocations: u32,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub name: String,
}

/// =============================
/// Errors
/// =============================

/// Error body shared by every endpoint: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        let status = match &e {
            AgentError::InvalidToolInput(_) | AgentError::PlanTooLong(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AgentError::ToolNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

type ApiResult = std::result::Result<Json<Value>, ApiError>;
type HandlerFuture = Pin<Box<dyn Future<Output = ApiResult> + Send>>;

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<SessionStore>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "operations": state.orchestrator.catalog().len(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Router & Chat Endpoints
/// =============================

async fn route_intent(
    State(state): State<ApiState>,
    Json(req): Json<IntentRequest>,
) -> Json<IntentResponse> {
    let routing = state.orchestrator.route(&req.prompt);
    info!(domains = ?routing.domains, fallback = routing.fallback, "Intent routed");

    Json(IntentResponse {
        status: "success".to_string(),
        domains: routing.domains.iter().map(|d| d.to_string()).collect(),
        tools_loaded: routing
            .operation_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        fallback: routing.fallback,
    })
}

/// A chat naming a `session_id` continues that conversation; without one the
/// turn runs on a throwaway conversation that is never stored.
async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> std::result::Result<Json<ChatResponse>, ApiError> {
    let requested = req
        .session_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(session_id_from_str);

    let (session_id, outcome) = match requested {
        Some(session_id) => {
            info!(session_id = %session_id, "Chat message received");
            let conversation = state.sessions.get_or_create(session_id).await;
            let mut conversation = conversation.lock().await;
            let outcome = state
                .orchestrator
                .run_turn(&mut conversation, &req.message)
                .await;
            (session_id, outcome)
        }
        None => {
            let mut conversation = Conversation::new(Uuid::new_v4());
            info!(session_id = %conversation.session_id, "One-shot chat message received");
            let outcome = state
                .orchestrator
                .run_turn(&mut conversation, &req.message)
                .await;
            (conversation.session_id, outcome)
        }
    };

    let outcome = outcome.map_err(|e| {
        error!(session_id = %session_id, error = %e, "Turn failed");
        ApiError::from(e)
    })?;

    Ok(Json(ChatResponse {
        reply: outcome.reply,
        session_id: session_id.to_string(),
        tools_loaded: outcome
            .routing
            .operation_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        model_invocations: outcome.model_invocations,
    }))
}

async fn list_operations(State(state): State<ApiState>) -> Json<Value> {
    let operations: Vec<Value> = state
        .orchestrator
        .catalog()
        .all_operations()
        .iter()
        .map(|op| {
            json!({
                "name": op.name(),
                "domain": op.domain(),
                "description": op.description(),
                "parameters": op.definition().parameters,
            })
        })
        .collect();

    Json(json!({ "operations": operations }))
}

/// =============================
/// Direct Operation Endpoints
/// =============================

async fn run_operation(state: &ApiState, operation: &str, arguments: Value) -> ApiResult {
    match state
        .orchestrator
        .execute_operation(operation, &arguments)
        .await?
    {
        OperationOutput::Success(data) => Ok(Json(data)),
        OperationOutput::Failure(failure) => {
            Err(ApiError::new(StatusCode::BAD_REQUEST, failure.message))
        }
    }
}

/// Operation arguments taken from the request body: a JSON object, or `{}`
/// when the body is empty.
pub struct OperationArgs(Value);

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let mime = ct.split(';').next().unwrap_or("").trim();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

#[async_trait]
impl<S> FromRequest<S> for OperationArgs
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let json_content = is_json_content_type(req.headers());
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(json!({})));
        }
        if !json_content {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "Expected request with `Content-Type: application/json`",
            ));
        }

        let Json(value) = Json::<Value>::from_bytes(&bytes)
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
        if !value.is_object() {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "Request body must be a JSON object",
            ));
        }
        Ok(Self(value))
    }
}

/// Handler running `operation` with the path id stored under `id_key`,
/// merged over an optional JSON body.
fn with_id(
    operation: &'static str,
    id_key: &'static str,
) -> impl Fn(State<ApiState>, Path<i64>, OperationArgs) -> HandlerFuture + Clone + Send + Sync + 'static {
    move |State(state): State<ApiState>, Path(id): Path<i64>, OperationArgs(mut arguments): OperationArgs| -> HandlerFuture {
        Box::pin(async move {
            arguments[id_key] = json!(id);
            run_operation(&state, operation, arguments).await
        })
    }
}

/// Handler running `operation` with the JSON body as arguments.
fn with_body(
    operation: &'static str,
) -> impl Fn(State<ApiState>, OperationArgs) -> HandlerFuture + Clone + Send + Sync + 'static {
    move |State(state): State<ApiState>, OperationArgs(arguments): OperationArgs| -> HandlerFuture {
        Box::pin(async move { run_operation(&state, operation, arguments).await })
    }
}

async fn search_clients(
    State(state): State<ApiState>,
    Query(params): Query<SearchParams>,
) -> ApiResult {
    run_operation(
        &state,
        "search_clients_by_name",
        json!({ "name_query": params.name }),
    )
    .await
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    router_with_state(ApiState {
        orchestrator,
        sessions: Arc::new(SessionStore::new()),
    })
}

/// Router over caller-supplied state, so the session store can be shared.
pub fn router_with_state(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/router/intent", post(route_intent))
        .route("/api/chat", post(chat_handler))
        .route("/api/operations", get(list_operations))
        // ===== Clients & groups =====
        .route("/api/clients/search", get(search_clients))
        .route("/api/clients", post(with_body("create_client")))
        .route("/api/clients/:id", get(with_id("get_client_details", "client_id")))
        .route(
            "/api/clients/:id/accounts",
            get(with_id("get_client_accounts", "client_id")),
        )
        .route(
            "/api/clients/:id/activate",
            post(with_id("activate_client", "client_id")),
        )
        .route(
            "/api/clients/:id/mobile",
            put(with_id("update_client_mobile", "client_id")),
        )
        .route("/api/clients/:id/close", post(with_id("close_client", "client_id")))
        .route("/api/groups", post(with_body("create_group")))
        .route("/api/groups/:id", get(with_id("get_group_details", "group_id")))
        // ===== Loans =====
        .route("/api/loans", post(with_body("create_loan")))
        .route("/api/loans/:id", get(with_id("get_loan_details", "loan_id")))
        .route(
            "/api/loans/:id/schedule",
            get(with_id("get_repayment_schedule", "loan_id")),
        )
        .route(
            "/api/loans/:id/approve-disburse",
            post(with_id("approve_and_disburse_loan", "loan_id")),
        )
        .route(
            "/api/loans/:id/reject",
            post(with_id("reject_loan_application", "loan_id")),
        )
        .route(
            "/api/loans/:id/repayment",
            post(with_id("make_loan_repayment", "loan_id")),
        )
        .route("/api/loans/:id/late-fee", post(with_id("apply_late_fee", "loan_id")))
        .route(
            "/api/loans/:id/waive-interest",
            post(with_id("waive_interest", "loan_id")),
        )
        // ===== Savings =====
        .route("/api/savings", post(with_body("create_savings_account")))
        .route("/api/savings/:id", get(with_id("get_savings_account", "account_id")))
        .route(
            "/api/savings/:id/transactions",
            get(with_id("get_savings_transactions", "account_id")),
        )
        .route(
            "/api/savings/:id/approve-activate",
            post(with_id("approve_and_activate_savings", "account_id")),
        )
        .route(
            "/api/savings/:id/close",
            post(with_id("close_savings_account", "account_id")),
        )
        .route(
            "/api/savings/:id/deposit",
            post(with_id("deposit_savings", "account_id")),
        )
        .route(
            "/api/savings/:id/withdraw",
            post(with_id("withdraw_savings", "account_id")),
        )
        .route(
            "/api/savings/:id/charge",
            post(with_id("apply_savings_charge", "account_id")),
        )
        .route(
            "/api/savings/:id/post-interest",
            post(with_id("calculate_and_post_interest", "account_id")),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::OperationCatalog;
    use crate::config::AgentConfig;
    use crate::gateway::StubBackend;
    use crate::llm::{ModelResponse, ScriptedModel};
    use crate::models::{FailureKind, OperationCall};
    use crate::router::{IntentRouter, KeywordTable};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use chrono::NaiveDate;
    use tower::ServiceExt;

    fn app_with(script: Vec<ModelResponse>, backend: StubBackend, max: u32) -> (Router, Arc<StubBackend>) {
        let catalog = Arc::new(OperationCatalog::banking().unwrap());
        let router = Arc::new(IntentRouter::new(catalog, KeywordTable::default()));
        let backend = Arc::new(backend);
        let orchestrator = Orchestrator::new(
            router,
            Arc::new(ScriptedModel::new(script)),
            backend.clone(),
            AgentConfig {
                max_model_invocations: max,
            },
        )
        .with_business_date(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
        (create_router(Arc::new(orchestrator)), backend)
    }

    fn app(backend: StubBackend) -> (Router, Arc<StubBackend>) {
        app_with(vec![ModelResponse::Text("ok".to_string())], backend, 10)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(StubBackend::new());
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["operations"], 26);
    }

    #[tokio::test]
    async fn test_intent_endpoint_reports_routing() {
        let (app, _) = app(StubBackend::new());
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/router/intent",
            Some(json!({"prompt": "What's my savings balance and can I also check my loan status"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["domains"], json!(["loans", "savings"]));
        assert_eq!(body["fallback"], false);
        assert_eq!(body["tools_loaded"].as_array().unwrap().len(), 17);

        let (_, body) = send(
            &app,
            Method::POST,
            "/api/router/intent",
            Some(json!({"prompt": "good morning"})),
        )
        .await;
        assert_eq!(body["fallback"], true);
        assert_eq!(body["tools_loaded"].as_array().unwrap().len(), 26);
    }

    #[tokio::test]
    async fn test_chat_round_trip_keeps_session() {
        let (app, backend) = app_with(
            vec![
                ModelResponse::Calls(vec![OperationCall::new(
                    "get_loan_details",
                    json!({"loan_id": 500}),
                )]),
                ModelResponse::Text("Loan 500 is active.".to_string()),
            ],
            StubBackend::new(),
            10,
        );

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/chat",
            Some(json!({"message": "status of loan 500", "session_id": "teller-1"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "Loan 500 is active.");
        assert_eq!(body["model_invocations"], 2);
        assert_eq!(
            body["session_id"],
            session_id_from_str("teller-1").to_string()
        );
        assert!(body["tools_loaded"]
            .as_array()
            .unwrap()
            .contains(&json!("get_loan_details")));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_sessionless_chats_are_not_retained() {
        let catalog = Arc::new(OperationCatalog::banking().unwrap());
        let orchestrator = Orchestrator::new(
            Arc::new(IntentRouter::new(catalog, KeywordTable::default())),
            Arc::new(ScriptedModel::new(vec![ModelResponse::Text("Hello.".to_string())])),
            Arc::new(StubBackend::new()),
            AgentConfig::default(),
        );
        let sessions = Arc::new(SessionStore::new());
        let app = router_with_state(ApiState {
            orchestrator: Arc::new(orchestrator),
            sessions: sessions.clone(),
        });

        for _ in 0..50 {
            let (status, body) = send(
                &app,
                Method::POST,
                "/api/chat",
                Some(json!({"message": "good morning"})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["reply"], "Hello.");
        }
        assert_eq!(sessions.len().await, 0);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/chat",
            Some(json!({"message": "good morning", "session_id": "teller-9"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sessions.len().await, 1);
        let kept = sessions.get(session_id_from_str("teller-9")).await.unwrap();
        assert_eq!(kept.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_chat_plan_too_long_is_422() {
        let (app, _) = app_with(
            vec![ModelResponse::Calls(vec![OperationCall::new(
                "get_loan_details",
                json!({"loan_id": 1}),
            )])],
            StubBackend::new(),
            2,
        );
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/chat",
            Some(json!({"message": "loan 1"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("2"));
    }

    #[tokio::test]
    async fn test_operations_listing() {
        let (app, _) = app(StubBackend::new());
        let (status, body) = send(&app, Method::GET, "/api/operations", None).await;
        assert_eq!(status, StatusCode::OK);
        let operations = body["operations"].as_array().unwrap();
        assert_eq!(operations.len(), 26);
        assert_eq!(operations[0]["name"], "search_clients_by_name");
        assert_eq!(operations[0]["domain"], "clients");
        assert_eq!(operations[0]["parameters"]["type"], "object");
    }

    #[tokio::test]
    async fn test_withdraw_rejection_maps_to_400() {
        let backend = StubBackend::new().respond(
            "POST",
            "savingsaccounts/3/transactions",
            OperationOutput::failure(
                FailureKind::Rejected { status: 400 },
                "Validation Error: Insufficient balance",
            ),
        );
        let (app, _) = app(backend);
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/savings/3/withdraw",
            Some(json!({"amount": 1000})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"detail": "Validation Error: Insufficient balance"}));
    }

    #[tokio::test]
    async fn test_missing_amount_is_422() {
        let (app, backend) = app(StubBackend::new());
        let (status, body) = send(&app, Method::POST, "/api/loans/7/repayment", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("amount"));
        assert!(backend.calls().is_empty());
    }

    async fn send_raw(app: &Router, uri: &str, content_type: Option<&str>, body: &str) -> (StatusCode, Value) {
        let mut request = Request::builder().method(Method::POST).uri(uri);
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        let response = app
            .clone()
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_unreadable_body_is_400() {
        let (app, backend) = app(StubBackend::new());

        let (status, body) = send_raw(&app, "/api/loans/7/repayment", Some("application/json"), "{\"amount\": ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());

        let (status, body) = send_raw(&app, "/api/loans/7/repayment", None, r#"{"amount": 50}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("Content-Type"));

        let (status, body) = send_raw(&app, "/api/loans/7/repayment", Some("application/json"), "[50]").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Request body must be a JSON object");

        assert!(backend.calls().is_empty());

        let (status, _) = send_raw(&app, "/api/savings/3/post-interest", None, "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_direct_endpoints_reach_backend() {
        let backend = StubBackend::new().respond(
            "GET",
            "clients/42",
            OperationOutput::Success(json!({"id": 42, "displayName": "Maria Lopez"})),
        );
        let (app, backend) = app(backend);

        let (status, body) = send(&app, Method::GET, "/api/clients/42", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["displayName"], "Maria Lopez");

        let (status, _) = send(&app, Method::GET, "/api/clients/search?name=Maria", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/clients/42/mobile",
            Some(json!({"new_mobile_no": "555-0199"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/loans",
            Some(json!({"client_id": 42, "principal": 5000, "months": 12})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let calls = backend.calls();
        assert_eq!(calls[1].query_value("query"), Some("Maria"));
        assert_eq!(calls[2].method, reqwest::Method::PUT);
        assert_eq!(calls[2].path, "clients/42");
        assert_eq!(calls[3].path, "loans");
        assert_eq!(calls[3].body.as_ref().unwrap()["submittedOnDate"], "16 October 2026");
    }
}
