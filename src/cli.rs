//! `mifos` command-line front end
//!
//! A thin client for the HTTP API: every subcommand maps to exactly one API
//! request, whose status and JSON body are printed as-is.

use clap::{Args, Parser, Subcommand};
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;

use crate::Result;

#[derive(Debug, Parser)]
#[command(
    name = "mifos",
    about = "Operate a Mifos X tenant through the banking agent API",
    version,
    after_help = "Examples:\n  mifos clients search Maria\n  mifos loans repay 12 150.00\n  mifos route --prompt \"deposit 200 into account 3\"\n  mifos ask what is the balance of savings account 3"
)]
pub struct Cli {
    /// Base URL of the agent API
    #[arg(long, env = "MIFOS_SERVER", default_value = "http://localhost:8000", global = true)]
    pub server: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Client lifecycle
    #[command(subcommand)]
    Clients(ClientsCommand),
    /// Groups of clients
    #[command(subcommand)]
    Groups(GroupsCommand),
    /// Loan lifecycle
    #[command(subcommand)]
    Loans(LoansCommand),
    /// Savings accounts
    #[command(subcommand)]
    Savings(SavingsCommand),
    /// Show which operations a prompt would expose
    Route {
        #[arg(long)]
        prompt: String,
    },
    /// Ask the agent in natural language
    Ask {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Continue an existing conversation
        #[arg(long)]
        session: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ClientsCommand {
    /// Search clients by name
    Search { name: String },
    Get { id: i64 },
    /// List a client's loan and savings accounts
    Accounts { id: i64 },
    Create(CreateClient),
    Activate { id: i64 },
    /// Change a client's mobile number
    Mobile { id: i64, mobile: String },
    Close {
        id: i64,
        #[arg(long)]
        reason_id: Option<i64>,
    },
}

#[derive(Debug, Args)]
pub struct CreateClient {
    pub firstname: String,
    pub lastname: String,
    #[arg(long)]
    pub mobile: Option<String>,
    #[arg(long)]
    pub office_id: Option<i64>,
    /// Register without activating
    #[arg(long)]
    pub inactive: bool,
}

#[derive(Debug, Subcommand)]
pub enum GroupsCommand {
    Create {
        name: String,
        #[arg(long)]
        office_id: Option<i64>,
        /// Comma-separated client IDs
        #[arg(long, value_delimiter = ',')]
        members: Vec<i64>,
    },
    Get { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum LoansCommand {
    Get { id: i64 },
    /// Show the repayment schedule
    Schedule { id: i64 },
    Create {
        client_id: i64,
        principal: f64,
        months: i64,
        #[arg(long)]
        product_id: Option<i64>,
    },
    /// Approve and disburse
    Approve {
        id: i64,
        #[arg(long)]
        amount: Option<f64>,
    },
    Reject {
        id: i64,
        #[arg(long)]
        note: Option<String>,
    },
    Repay { id: i64, amount: f64 },
    LateFee {
        id: i64,
        amount: f64,
        #[arg(long)]
        charge_id: Option<i64>,
    },
    /// Waive interest
    Waive {
        id: i64,
        amount: f64,
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum SavingsCommand {
    Get { id: i64 },
    Transactions { id: i64 },
    Create {
        client_id: i64,
        #[arg(long)]
        product_id: Option<i64>,
    },
    /// Approve and activate
    Approve { id: i64 },
    Close { id: i64 },
    Deposit { id: i64, amount: f64 },
    Withdraw { id: i64, amount: f64 },
    Charge {
        id: i64,
        amount: f64,
        #[arg(long)]
        charge_id: Option<i64>,
    },
    PostInterest { id: i64 },
}

/// One request against the agent API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PUT,
            ..Self::post(path, body)
        }
    }
}

/// JSON object from the fields that are present.
fn object(fields: Vec<(&str, Option<Value>)>) -> Value {
    let map: Map<String, Value> = fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .collect();
    Value::Object(map)
}

impl Command {
    pub fn to_request(&self) -> ApiRequest {
        match self {
            Command::Clients(cmd) => cmd.to_request(),
            Command::Groups(cmd) => cmd.to_request(),
            Command::Loans(cmd) => cmd.to_request(),
            Command::Savings(cmd) => cmd.to_request(),
            Command::Route { prompt } => {
                ApiRequest::post("/api/router/intent", json!({ "prompt": prompt }))
            }
            Command::Ask { query, session } => ApiRequest::post(
                "/api/chat",
                object(vec![
                    ("message", Some(json!(query.join(" ")))),
                    ("session_id", session.as_ref().map(|s| json!(s))),
                ]),
            ),
        }
    }
}

impl ClientsCommand {
    fn to_request(&self) -> ApiRequest {
        match self {
            ClientsCommand::Search { name } => {
                let mut request = ApiRequest::get("/api/clients/search");
                request.query.push(("name".to_string(), name.clone()));
                request
            }
            ClientsCommand::Get { id } => ApiRequest::get(format!("/api/clients/{}", id)),
            ClientsCommand::Accounts { id } => {
                ApiRequest::get(format!("/api/clients/{}/accounts", id))
            }
            ClientsCommand::Create(args) => ApiRequest::post(
                "/api/clients",
                object(vec![
                    ("firstname", Some(json!(args.firstname))),
                    ("lastname", Some(json!(args.lastname))),
                    ("mobile_no", args.mobile.as_ref().map(|m| json!(m))),
                    ("office_id", args.office_id.map(|o| json!(o))),
                    ("is_active", Some(json!(!args.inactive))),
                ]),
            ),
            ClientsCommand::Activate { id } => {
                ApiRequest::post(format!("/api/clients/{}/activate", id), json!({}))
            }
            ClientsCommand::Mobile { id, mobile } => ApiRequest::put(
                format!("/api/clients/{}/mobile", id),
                json!({ "new_mobile_no": mobile }),
            ),
            ClientsCommand::Close { id, reason_id } => ApiRequest::post(
                format!("/api/clients/{}/close", id),
                object(vec![("closure_reason_id", reason_id.map(|r| json!(r)))]),
            ),
        }
    }
}

impl GroupsCommand {
    fn to_request(&self) -> ApiRequest {
        match self {
            GroupsCommand::Create {
                name,
                office_id,
                members,
            } => ApiRequest::post(
                "/api/groups",
                object(vec![
                    ("name", Some(json!(name))),
                    ("office_id", office_id.map(|o| json!(o))),
                    (
                        "client_members",
                        (!members.is_empty()).then(|| json!(members)),
                    ),
                ]),
            ),
            GroupsCommand::Get { id } => ApiRequest::get(format!("/api/groups/{}", id)),
        }
    }
}

impl LoansCommand {
    fn to_request(&self) -> ApiRequest {
        match self {
            LoansCommand::Get { id } => ApiRequest::get(format!("/api/loans/{}", id)),
            LoansCommand::Schedule { id } => {
                ApiRequest::get(format!("/api/loans/{}/schedule", id))
            }
            LoansCommand::Create {
                client_id,
                principal,
                months,
                product_id,
            } => ApiRequest::post(
                "/api/loans",
                object(vec![
                    ("client_id", Some(json!(client_id))),
                    ("principal", Some(json!(principal))),
                    ("months", Some(json!(months))),
                    ("product_id", product_id.map(|p| json!(p))),
                ]),
            ),
            LoansCommand::Approve { id, amount } => ApiRequest::post(
                format!("/api/loans/{}/approve-disburse", id),
                object(vec![("amount", amount.map(|a| json!(a)))]),
            ),
            LoansCommand::Reject { id, note } => ApiRequest::post(
                format!("/api/loans/{}/reject", id),
                object(vec![("note", note.as_ref().map(|n| json!(n)))]),
            ),
            LoansCommand::Repay { id, amount } => ApiRequest::post(
                format!("/api/loans/{}/repayment", id),
                json!({ "amount": amount }),
            ),
            LoansCommand::LateFee {
                id,
                amount,
                charge_id,
            } => ApiRequest::post(
                format!("/api/loans/{}/late-fee", id),
                object(vec![
                    ("fee_amount", Some(json!(amount))),
                    ("charge_id", charge_id.map(|c| json!(c))),
                ]),
            ),
            LoansCommand::Waive { id, amount, note } => ApiRequest::post(
                format!("/api/loans/{}/waive-interest", id),
                object(vec![
                    ("amount", Some(json!(amount))),
                    ("note", note.as_ref().map(|n| json!(n))),
                ]),
            ),
        }
    }
}

impl SavingsCommand {
    fn to_request(&self) -> ApiRequest {
        match self {
            SavingsCommand::Get { id } => ApiRequest::get(format!("/api/savings/{}", id)),
            SavingsCommand::Transactions { id } => {
                ApiRequest::get(format!("/api/savings/{}/transactions", id))
            }
            SavingsCommand::Create {
                client_id,
                product_id,
            } => ApiRequest::post(
                "/api/savings",
                object(vec![
                    ("client_id", Some(json!(client_id))),
                    ("product_id", product_id.map(|p| json!(p))),
                ]),
            ),
            SavingsCommand::Approve { id } => {
                ApiRequest::post(format!("/api/savings/{}/approve-activate", id), json!({}))
            }
            SavingsCommand::Close { id } => {
                ApiRequest::post(format!("/api/savings/{}/close", id), json!({}))
            }
            SavingsCommand::Deposit { id, amount } => ApiRequest::post(
                format!("/api/savings/{}/deposit", id),
                json!({ "amount": amount }),
            ),
            SavingsCommand::Withdraw { id, amount } => ApiRequest::post(
                format!("/api/savings/{}/withdraw", id),
                json!({ "amount": amount }),
            ),
            SavingsCommand::Charge {
                id,
                amount,
                charge_id,
            } => ApiRequest::post(
                format!("/api/savings/{}/charge", id),
                object(vec![
                    ("amount", Some(json!(amount))),
                    ("charge_id", charge_id.map(|c| json!(c))),
                ]),
            ),
            SavingsCommand::PostInterest { id } => {
                ApiRequest::post(format!("/api/savings/{}/post-interest", id), json!({}))
            }
        }
    }
}

/// Send `request` to `server`; returns the status code and the parsed body
/// (raw text as a JSON string when the body is not JSON).
pub async fn send(server: &str, request: &ApiRequest) -> Result<(u16, Value)> {
    let client = Client::builder().timeout(Duration::from_secs(300)).build()?;
    let url = format!("{}{}", server.trim_end_matches('/'), request.path);
    debug!(method = %request.method, url = %url, "Calling agent API");

    let mut builder = client.request(request.method.clone(), &url);
    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let text = response.text().await?;
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    Ok((status, body))
}

/// Execute the parsed command line and print the outcome.
pub async fn run(cli: Cli) -> ExitCode {
    let request = cli.command.to_request();

    match send(&cli.server, &request).await {
        Ok((status, body)) => {
            println!("Status: {}", status);
            match serde_json::to_string_pretty(&body) {
                Ok(pretty) => println!("{}", pretty),
                Err(_) => println!("{}", body),
            }
            if status >= 400 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Could not reach {}: {}", cli.server, e);
            ExitCode::FAILURE
        }
    }
}
