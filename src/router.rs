//! Intent Router
//!
//! Decides which operations the model gets to see for a turn. Routing is
//! purely lexical: a domain is activated when one of its keywords occurs
//! anywhere in the lower-cased utterance, and every operation of an activated
//! domain is exposed. An utterance that activates nothing exposes the whole
//! catalog.

use crate::catalog::{Operation, OperationCatalog};
use crate::error::AgentError;
use crate::models::Domain;
use crate::Result;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Keyword lists per domain. Static, so the default table costs nothing.
const CLIENT_KEYWORDS: &[&str] = &[
    "client", "customer", "person", "user", "borrower", "group", "member", "mobile", "phone",
];

const LOAN_KEYWORDS: &[&str] = &[
    "loan", "borrow", "credit", "repay", "disburse", "approve", "schedule",
    // Shared with savings
    "fee", "interest", "waive",
];

const SAVINGS_KEYWORDS: &[&str] = &[
    "saving", "deposit", "withdraw", "account", "balance",
    // Shared with loans
    "fee", "interest", "charge",
];

/// Validated domain → keywords table.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordTable {
    entries: Vec<(Domain, Vec<String>)>,
}

impl KeywordTable {
    /// Every domain must appear once with at least one non-empty, lower-case
    /// keyword.
    pub fn new(entries: Vec<(Domain, Vec<String>)>) -> Result<Self> {
        for domain in Domain::ALL {
            match entries.iter().filter(|(d, _)| *d == domain).count() {
                0 => {
                    return Err(AgentError::ConfigError(format!(
                        "keyword table has no entry for `{}`",
                        domain
                    )))
                }
                1 => {}
                _ => {
                    return Err(AgentError::ConfigError(format!(
                        "keyword table lists `{}` more than once",
                        domain
                    )))
                }
            }
        }

        for (domain, keywords) in &entries {
            if keywords.is_empty() {
                return Err(AgentError::ConfigError(format!(
                    "domain `{}` has no keywords",
                    domain
                )));
            }
            if let Some(bad) = keywords
                .iter()
                .find(|k| k.trim().is_empty() || **k != k.to_lowercase())
            {
                return Err(AgentError::ConfigError(format!(
                    "domain `{}` has an invalid keyword `{}`",
                    domain, bad
                )));
            }
        }

        Ok(Self { entries })
    }

    pub fn keywords(&self, domain: Domain) -> &[String] {
        self.entries
            .iter()
            .find(|(d, _)| *d == domain)
            .map(|(_, keywords)| keywords.as_slice())
            .unwrap_or(&[])
    }

    fn matches(&self, domain: Domain, lowered: &str) -> bool {
        self.keywords(domain)
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            entries: vec![
                (Domain::Clients, owned(CLIENT_KEYWORDS)),
                (Domain::Loans, owned(LOAN_KEYWORDS)),
                (Domain::Savings, owned(SAVINGS_KEYWORDS)),
            ],
        }
    }
}

/// Operations exposed for one human turn.
#[derive(Clone)]
pub struct RoutingResult {
    /// Activated domains, in routing order.
    pub domains: Vec<Domain>,
    pub operations: Vec<Arc<dyn Operation>>,
    /// No keyword matched and every domain was activated.
    pub fallback: bool,
}

impl RoutingResult {
    pub fn operation_names(&self) -> Vec<&'static str> {
        self.operations.iter().map(|op| op.name()).collect()
    }

    pub fn exposes(&self, name: &str) -> bool {
        self.operations.iter().any(|op| op.name() == name)
    }
}

impl fmt::Debug for RoutingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingResult")
            .field("domains", &self.domains)
            .field("operations", &self.operation_names())
            .field("fallback", &self.fallback)
            .finish()
    }
}

pub struct IntentRouter {
    catalog: Arc<OperationCatalog>,
    keywords: KeywordTable,
}

impl IntentRouter {
    pub fn new(catalog: Arc<OperationCatalog>, keywords: KeywordTable) -> Self {
        Self { catalog, keywords }
    }

    pub fn catalog(&self) -> &Arc<OperationCatalog> {
        &self.catalog
    }

    /// Route an utterance. Never fails and never returns an empty set.
    pub fn route(&self, utterance: &str) -> RoutingResult {
        let lowered = utterance.to_lowercase();

        let matched: Vec<Domain> = Domain::ALL
            .into_iter()
            .filter(|domain| self.keywords.matches(*domain, &lowered))
            .collect();

        let fallback = matched.is_empty();
        let domains = if fallback { Domain::ALL.to_vec() } else { matched };

        let mut seen = HashSet::new();
        let operations: Vec<Arc<dyn Operation>> = domains
            .iter()
            .flat_map(|domain| self.catalog.list_domain(*domain).iter())
            .filter(|op| seen.insert(op.name()))
            .cloned()
            .collect();

        debug!(
            domains = ?domains,
            operations = operations.len(),
            fallback,
            "Routed utterance"
        );

        RoutingResult {
            domains,
            operations,
            fallback,
        }
    }
}
