#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use invocation_core::test_helpers::{
    MemorySecretStore, MemoryTableStore, RecordingSink, StaticFetcher,
};
use invocation_core::{
    ApiGatewayResponse, Collaborators, ExecutionConfig, Executor, Handler, HandlerError,
    PayloadRule,
};
use serde_json::Value;

pub const SECRET_NAME: &str = "prod/payments/credentials";
pub const SECRET_TEXT: &str = "{\"apiKey\":\"sk-live-4f9a\",\"region\":\"eu-west-1\"}";

/// Collaborators, sink and handler call counter shared with a test.
pub struct Harness {
    pub sink: Arc<RecordingSink>,
    pub tables: Arc<MemoryTableStore>,
    pub http: Arc<StaticFetcher>,
    pub handler_calls: Arc<AtomicUsize>,
    secrets: Vec<(String, String)>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            sink: Arc::new(RecordingSink::default()),
            tables: Arc::new(MemoryTableStore::default()),
            http: Arc::new(StaticFetcher::new("203.0.113.7\n")),
            handler_calls: Arc::new(AtomicUsize::new(0)),
            secrets: vec![(SECRET_NAME.to_string(), SECRET_TEXT.to_string())],
        }
    }

    pub fn with_secret(mut self, name: &str, text: &str) -> Self {
        self.secrets.push((name.to_string(), text.to_string()));
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            Arc::new(
                self.secrets
                    .iter()
                    .fold(MemorySecretStore::default(), |store, (name, text)| {
                        store.with_text(name, text)
                    }),
            ),
            self.tables.clone(),
            self.http.clone(),
        )
    }

    pub fn executor(&self, config: ExecutionConfig, handler: impl Handler) -> Executor {
        Executor::new(config, self.collaborators(), handler, self.sink.clone())
    }

    pub fn calls(&self) -> usize {
        self.handler_calls.load(Ordering::SeqCst)
    }
}

pub fn config(timeout_ms: u64, offset_ms: u64, rules: Vec<PayloadRule>) -> ExecutionConfig {
    ExecutionConfig {
        timeout: Duration::from_millis(timeout_ms),
        timeout_offset: Duration::from_millis(offset_ms),
        required_payload_keys: rules,
    }
}

pub fn ok(response: ApiGatewayResponse) -> Result<ApiGatewayResponse, HandlerError> {
    Ok(response)
}

pub fn body(response: &ApiGatewayResponse) -> Value {
    response.body_json().expect("response body should be json")
}

pub fn count_call(calls: &AtomicUsize) {
    calls.fetch_add(1, Ordering::SeqCst);
}
