//! Operation trait and catalog
//!
//! Operations are the only things the model can do to the banking core.
//! Each one describes itself (name, domain, description, parameter schema)
//! and turns validated arguments into backend calls. The catalog is a fixed
//! registry built once at startup; it holds no state and performs no I/O of
//! its own.

use crate::error::AgentError;
use crate::gateway::{BackendCall, BankingBackend};
use crate::models::{Domain, OperationOutput, ToolDefinition};
use crate::Result;
use chrono::{Local, NaiveDate};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

mod args;
pub mod clients;
pub mod loans;
pub mod savings;

pub use args::Args;
pub use clients::ClientOperation;
pub use loans::LoanOperation;
pub use savings::SavingsOperation;

/// Date pattern the backend expects on every dated write.
pub const BACKEND_DATE_FORMAT: &str = "dd MMMM yyyy";
pub const BACKEND_LOCALE: &str = "en";

/// Render a date the way `BACKEND_DATE_FORMAT` describes it.
pub fn backend_date(date: NaiveDate) -> String {
    date.format("%d %B %Y").to_string()
}

/// Add `dateFormat` and `locale` to a JSON object payload.
pub fn localized(mut body: Value) -> Value {
    if let Some(map) = body.as_object_mut() {
        map.insert("dateFormat".to_string(), json!(BACKEND_DATE_FORMAT));
        map.insert("locale".to_string(), json!(BACKEND_LOCALE));
    }
    body
}

//
// ================= Parameter schema =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    Number,
    String,
    Boolean,
    IntegerList,
}

impl ParamKind {
    fn json_schema(&self) -> Value {
        match self {
            ParamKind::Integer => json!({ "type": "integer" }),
            ParamKind::Number => json!({ "type": "number" }),
            ParamKind::String => json!({ "type": "string" }),
            ParamKind::Boolean => json!({ "type": "boolean" }),
            ParamKind::IntegerList => json!({ "type": "array", "items": { "type": "integer" } }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    Integer(i64),
    Boolean(bool),
    Text(&'static str),
}

impl ParamDefault {
    fn to_value(self) -> Value {
        match self {
            ParamDefault::Integer(v) => json!(v),
            ParamDefault::Boolean(v) => json!(v),
            ParamDefault::Text(v) => json!(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<ParamDefault>,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: true,
            default: None,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
            default: None,
        }
    }

    pub const fn defaulted(
        name: &'static str,
        kind: ParamKind,
        description: &'static str,
        default: ParamDefault,
    ) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
            default: Some(default),
        }
    }
}

//
// ================= Operation =================
//

/// What an operation needs at execution time.
pub struct OperationContext<'a> {
    pub backend: &'a dyn BankingBackend,
    /// Business date stamped on dated writes.
    pub today: NaiveDate,
}

impl<'a> OperationContext<'a> {
    pub fn new(backend: &'a dyn BankingBackend) -> Self {
        Self {
            backend,
            today: Local::now().date_naive(),
        }
    }

    pub fn with_date(backend: &'a dyn BankingBackend, today: NaiveDate) -> Self {
        Self { backend, today }
    }
}

/// A single named action against the banking core.
#[async_trait::async_trait]
pub trait Operation: Send + Sync {
    fn name(&self) -> &'static str;
    fn domain(&self) -> Domain;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> &'static [ParamSpec];

    /// Backend calls for validated arguments, in execution order. Later calls
    /// run only if every earlier one succeeded.
    fn backend_calls(&self, args: &Args, today: NaiveDate) -> Result<Vec<BackendCall>>;

    /// Reshape the final successful backend response.
    fn shape_response(&self, response: Value) -> Value {
        response
    }

    /// JSON-Schema function definition offered to the model.
    fn definition(&self) -> ToolDefinition {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in self.parameters() {
            let mut schema = param.kind.json_schema();
            schema["description"] = json!(param.description);
            if let Some(default) = param.default {
                schema["default"] = default.to_value();
            }
            properties.insert(param.name.to_string(), schema);
            if param.required {
                required.push(json!(param.name));
            }
        }

        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }

    /// Validate `arguments`, run the backend calls, shape the result.
    ///
    /// Only argument problems surface as `Err`; backend trouble is returned
    /// as an [`OperationOutput::Failure`].
    async fn execute(&self, arguments: &Value, ctx: &OperationContext<'_>) -> Result<OperationOutput> {
        let args = Args::validate(self.name(), self.parameters(), arguments)?;
        let calls = self.backend_calls(&args, ctx.today)?;

        let mut last = OperationOutput::Success(json!({}));
        for call in &calls {
            last = ctx.backend.send(call).await;
            if last.is_error() {
                debug!(operation = self.name(), path = %call.path, "Stopping after failed backend call");
                return Ok(last);
            }
        }

        Ok(last.map_success(|response| self.shape_response(response)))
    }
}

//
// ================= Catalog =================
//

/// Fixed registry of operations grouped by domain.
pub struct OperationCatalog {
    operations: Vec<Arc<dyn Operation>>,
    by_name: HashMap<&'static str, usize>,
    by_domain: BTreeMap<Domain, Vec<Arc<dyn Operation>>>,
}

impl OperationCatalog {
    /// Build a catalog, rejecting duplicate names and empty domains.
    pub fn new(operations: Vec<Arc<dyn Operation>>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(operations.len());
        let mut by_domain: BTreeMap<Domain, Vec<Arc<dyn Operation>>> = BTreeMap::new();

        for (index, operation) in operations.iter().enumerate() {
            if by_name.insert(operation.name(), index).is_some() {
                return Err(AgentError::InvalidCatalog(format!(
                    "operation `{}` registered twice",
                    operation.name()
                )));
            }
            by_domain
                .entry(operation.domain())
                .or_default()
                .push(Arc::clone(operation));
        }

        if let Some(empty) = Domain::ALL.iter().find(|d| !by_domain.contains_key(d)) {
            return Err(AgentError::InvalidCatalog(format!(
                "domain `{}` has no operations",
                empty
            )));
        }

        Ok(Self {
            operations,
            by_name,
            by_domain,
        })
    }

    /// The full banking catalog: clients, loans and savings lifecycles.
    pub fn banking() -> Result<Self> {
        let mut operations: Vec<Arc<dyn Operation>> = Vec::new();
        operations.extend(
            ClientOperation::ALL
                .iter()
                .map(|op| Arc::new(*op) as Arc<dyn Operation>),
        );
        operations.extend(
            LoanOperation::ALL
                .iter()
                .map(|op| Arc::new(*op) as Arc<dyn Operation>),
        );
        operations.extend(
            SavingsOperation::ALL
                .iter()
                .map(|op| Arc::new(*op) as Arc<dyn Operation>),
        );

        let catalog = Self::new(operations)?;
        info!(operations = catalog.len(), "Operation catalog ready");
        Ok(catalog)
    }

    pub fn list_domain(&self, domain: Domain) -> &[Arc<dyn Operation>] {
        self.by_domain
            .get(&domain)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_operations(&self) -> &[Arc<dyn Operation>] {
        &self.operations
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.by_name
            .get(name)
            .map(|&index| Arc::clone(&self.operations[index]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Look up `name` and execute it.
    pub async fn execute(
        &self,
        name: &str,
        arguments: &Value,
        ctx: &OperationContext<'_>,
    ) -> Result<OperationOutput> {
        let operation = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        operation.execute(arguments, ctx).await
    }

    /// Model-facing definitions for a set of operations.
    pub fn definitions<'a, I>(operations: I) -> Vec<ToolDefinition>
    where
        I: IntoIterator<Item = &'a Arc<dyn Operation>>,
    {
        operations.into_iter().map(|op| op.definition()).collect()
    }
}
