//! Validated operation arguments

use super::{ParamKind, ParamSpec};
use crate::error::AgentError;
use crate::Result;
use serde_json::{Map, Value};
use tracing::debug;

/// Arguments checked against an operation's parameter schema.
///
/// Defaults are filled in, required parameters are enforced and values are
/// coerced to their declared kind. Models frequently send numbers as strings,
/// so `"42"` is accepted where an integer is expected.
#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    operation: &'static str,
    values: Map<String, Value>,
}

impl Args {
    pub fn validate(operation: &'static str, params: &[ParamSpec], raw: &Value) -> Result<Self> {
        let supplied = match raw {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(AgentError::InvalidToolInput(format!(
                    "{}: arguments must be an object, got {}",
                    operation, other
                )))
            }
        };

        let mut values = Map::new();
        for param in params {
            match supplied.get(param.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    let coerced = coerce(param, value).ok_or_else(|| {
                        AgentError::InvalidToolInput(format!(
                            "{}: `{}` must be {}, got {}",
                            operation,
                            param.name,
                            kind_name(param.kind),
                            value
                        ))
                    })?;
                    values.insert(param.name.to_string(), coerced);
                }
                None => {
                    if let Some(default) = param.default {
                        values.insert(param.name.to_string(), default.to_value());
                    } else if param.required {
                        return Err(AgentError::InvalidToolInput(format!(
                            "{}: missing required argument `{}`",
                            operation, param.name
                        )));
                    }
                }
            }
        }

        for key in supplied.keys() {
            if !params.iter().any(|p| p.name == key) {
                debug!(operation, argument = %key, "Ignoring unknown argument");
            }
        }

        Ok(Self { operation, values })
    }

    fn missing(&self, name: &str) -> AgentError {
        AgentError::InvalidToolInput(format!("{}: missing argument `{}`", self.operation, name))
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        self.opt_int(name).ok_or_else(|| self.missing(name))
    }

    pub fn opt_int(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn number(&self, name: &str) -> Result<f64> {
        self.opt_number(name).ok_or_else(|| self.missing(name))
    }

    pub fn opt_number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    pub fn text(&self, name: &str) -> Result<&str> {
        self.opt_text(name).ok_or_else(|| self.missing(name))
    }

    pub fn opt_text(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn flag(&self, name: &str) -> Result<bool> {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| self.missing(name))
    }

    pub fn int_list(&self, name: &str) -> Option<Vec<i64>> {
        self.values
            .get(name)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_i64).collect())
    }
}

fn kind_name(kind: ParamKind) -> &'static str {
    match kind {
        ParamKind::Integer => "an integer",
        ParamKind::Number => "a number",
        ParamKind::String => "a string",
        ParamKind::Boolean => "a boolean",
        ParamKind::IntegerList => "a list of integers",
    }
}

fn coerce(param: &ParamSpec, value: &Value) -> Option<Value> {
    match param.kind {
        ParamKind::Integer => as_integer(value).map(Value::from),
        ParamKind::Number => match value {
            Value::Number(n) => n.as_f64().map(Value::from),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(Value::from),
            _ => None,
        },
        ParamKind::String => match value {
            Value::String(s) => Some(Value::String(s.clone())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        },
        ParamKind::Boolean => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        ParamKind::IntegerList => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| as_integer(item).map(Value::from))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            _ => None,
        },
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
