//! In-memory backend for development and tests
//!
//! Records every call and answers from a scripted table keyed by
//! `"{METHOD} {path}"`, falling back to an empty success.

use super::{BackendCall, BankingBackend};
use crate::models::OperationOutput;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

#[derive(Default)]
pub struct StubBackend {
    scripted: Mutex<HashMap<String, VecDeque<OperationOutput>>>,
    calls: Mutex<Vec<BackendCall>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `method path`. Queued responses are consumed in
    /// order; the last one keeps answering once the queue is down to it.
    pub fn respond(self, method: &str, path: &str, output: OperationOutput) -> Self {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key(method, path))
            .or_default()
            .push_back(output);
        self
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn key(method: &str, path: &str) -> String {
    format!("{} {}", method.to_uppercase(), path)
}

#[async_trait::async_trait]
impl BankingBackend for StubBackend {
    async fn send(&self, call: &BackendCall) -> OperationOutput {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.clone());

        let mut scripted = self.scripted.lock().unwrap_or_else(PoisonError::into_inner);
        match scripted.get_mut(&key(call.method.as_str(), &call.path)) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| OperationOutput::Success(json!({}))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| OperationOutput::Success(json!({}))),
            None => OperationOutput::Success(json!({})),
        }
    }
}
