//! Process-wide configuration
//!
//! Read once from the environment (optionally seeded from `.env`) and never
//! mutated afterwards.

use crate::error::AgentError;
use crate::Result;
use std::env;
use std::fmt;
use std::time::Duration;

const DEFAULT_TENANT: &str = "default";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1";
const DEFAULT_MAX_STEPS: u32 = 10;
const DEFAULT_PORT: u16 = 8000;

/// Connection settings for the banking core.
#[derive(Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub tenant_id: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    /// Local Fineract containers ship self-signed certificates.
    pub accept_invalid_certs: bool,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("tenant_id", &self.tenant_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Upper bound on model invocations inside one human turn.
    pub max_model_invocations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_model_invocations: DEFAULT_MAX_STEPS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub port: u16,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load through an arbitrary key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| AgentError::ConfigError(format!("{} is not set", key)))
        };

        let timeout_secs = parse_or(
            get("MIFOSX_TIMEOUT_SECS"),
            "MIFOSX_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        )?;

        let backend = BackendConfig {
            base_url: require("MIFOSX_BASE_URL")?.trim_end_matches('/').to_string(),
            tenant_id: get("MIFOSX_TENANT_ID").unwrap_or_else(|| DEFAULT_TENANT.to_string()),
            username: require("MIFOSX_USERNAME")?,
            password: require("MIFOSX_PASSWORD")?,
            timeout: Duration::from_secs(timeout_secs),
            accept_invalid_certs: parse_bool(get("MIFOSX_ACCEPT_INVALID_CERTS"), true)?,
        };

        let model = ModelConfig {
            base_url: get("OLLAMA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: 0.0,
            timeout: Duration::from_secs(parse_or(
                get("OLLAMA_TIMEOUT_SECS"),
                "OLLAMA_TIMEOUT_SECS",
                120,
            )?),
        };

        let max_model_invocations =
            parse_or(get("AGENT_MAX_STEPS"), "AGENT_MAX_STEPS", DEFAULT_MAX_STEPS)?;
        if max_model_invocations == 0 {
            return Err(AgentError::ConfigError(
                "AGENT_MAX_STEPS must be at least 1".to_string(),
            ));
        }

        let port = parse_or(
            get("PORT").or_else(|| get("API_PORT")),
            "PORT",
            DEFAULT_PORT,
        )?;

        Ok(Self {
            backend,
            model,
            agent: AgentConfig {
                max_model_invocations,
            },
            port,
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            AgentError::ConfigError(format!("{} has an invalid value `{}`", key, raw))
        }),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(AgentError::ConfigError(format!(
            "MIFOSX_ACCEPT_INVALID_CERTS has an invalid value `{}`",
            v
        ))),
    }
}
