//! Banking Agent Router
//!
//! A tool-calling agent for tellers working against a Mifos X / Fineract
//! core banking tenant:
//! - Routes each utterance to the operation domains it mentions
//! - Exposes only the routed operations to the model on its first pass
//! - Executes model-requested operations against the banking backend
//! - Feeds every result back until the model answers in plain text
//! - Publishes the same operations as MCP tools for external agents
//!
//! TURN LOOP:
//! UTTERANCE → ROUTE → MODEL ⇄ OPERATIONS → REPLY

pub mod agent;
pub mod api;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod mcp;
pub mod memory;
pub mod models;
pub mod router;

pub use error::Result;

// Re-export common types
pub use agent::{Orchestrator, TurnOutcome};
pub use catalog::{Operation, OperationCatalog};
pub use gateway::{BankingBackend, FineractGateway};
pub use models::*;
pub use router::{IntentRouter, RoutingResult};
