use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::collaborators::{Attributes, Collaborators, HttpMethod, WriteAck};
use crate::error::CollaboratorError;
use crate::log::StructuredLog;
use crate::responses::ApiGatewayResponse;
use crate::timers::Timers;
use crate::validation::PayloadRule;

/// Per-invocation state. Only reachable through [`InvocationContext`].
#[derive(Debug)]
pub(crate) struct InvocationState {
    pub(crate) raw_event: Value,
    pub(crate) parsed_body: Value,
    pub(crate) is_body_json: bool,
    pub(crate) request_id: Option<String>,
    pub(crate) log: StructuredLog,
    pub(crate) data_to_omit: BTreeSet<String>,
    pub(crate) secrets: BTreeMap<String, Value>,
    pub(crate) timers: Timers,
    pub(crate) response: Option<ApiGatewayResponse>,
    pub(crate) timeout_triggered: bool,
    pub(crate) required_payload_keys: Vec<PayloadRule>,
    sealed: bool,
}

impl InvocationState {
    pub(crate) fn new(
        raw_event: Value,
        request_id: Option<String>,
        required_payload_keys: Vec<PayloadRule>,
    ) -> Self {
        let (parsed_body, is_body_json) = parse_body(&raw_event);
        Self {
            raw_event,
            parsed_body,
            is_body_json,
            request_id,
            log: StructuredLog::new(),
            data_to_omit: BTreeSet::new(),
            secrets: BTreeMap::new(),
            timers: Timers::new(),
            response: None,
            timeout_triggered: false,
            required_payload_keys,
            sealed: false,
        }
    }

    /// Once sealed, handler writes are dropped: the log has been emitted and
    /// the response returned.
    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }
}

/// Handle to the current invocation, given to the handler.
///
/// Clones share the same state. Every accessor takes the state lock for a
/// short synchronous section only, so the orchestrator and the handler never
/// write at the same time.
#[derive(Clone)]
pub struct InvocationContext {
    state: Arc<Mutex<InvocationState>>,
    collaborators: Collaborators,
}

impl InvocationContext {
    pub(crate) fn new(state: InvocationState, collaborators: Collaborators) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            collaborators,
        }
    }

    fn lock(&self) -> MutexGuard<'_, InvocationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut InvocationState) -> R) -> R {
        f(&mut self.lock())
    }

    // Drops the write after seal so an abandoned handler cannot touch emitted state.
    fn write(&self, what: &str, f: impl FnOnce(&mut InvocationState)) {
        let mut state = self.lock();
        if state.sealed {
            debug!(write = what, "invocation already finalized, dropping write");
            return;
        }
        f(&mut state);
    }

    pub fn raw_event(&self) -> Value {
        self.lock().raw_event.clone()
    }

    pub fn parsed_body(&self) -> Value {
        self.lock().parsed_body.clone()
    }

    pub fn is_body_json(&self) -> bool {
        self.lock().is_body_json
    }

    pub fn request_id(&self) -> Option<String> {
        self.lock().request_id.clone()
    }

    pub fn http_method(&self) -> Option<String> {
        http_method(&self.lock().raw_event).map(str::to_string)
    }

    pub fn add_to_log(&self, name: impl Into<String>, body: impl Serialize) {
        let name = name.into();
        self.write("log", |state| state.log.add(name, body));
    }

    pub fn log_entry(&self, name: &str) -> Option<Value> {
        self.lock().log.get(name).cloned()
    }

    /// Registers a value that must never appear in the emitted log or response.
    pub fn omit(&self, token: impl Into<String>) {
        let token = token.into();
        self.write("omit", |state| {
            state.data_to_omit.insert(token);
        });
    }

    pub fn secret(&self, short_name: &str) -> Option<Value> {
        self.lock().secrets.get(short_name).cloned()
    }

    pub fn start_timer(&self, name: impl Into<String>) {
        let name = name.into();
        self.write("timer", |state| state.timers.start(name));
    }

    pub fn stop_timer(&self, name: &str) -> Option<u64> {
        let mut duration = None;
        self.write("timer", |state| duration = state.timers.stop(name));
        duration
    }

    pub(crate) fn stop_timer_with_note(&self, name: &str, note: &str) -> Option<u64> {
        let mut duration = None;
        self.write("timer", |state| {
            duration = state.timers.stop_with_note(name, note)
        });
        duration
    }

    pub fn timer_duration_ms(&self, name: &str) -> Option<u64> {
        self.lock().timers.duration_ms(name)
    }

    pub fn timeout_triggered(&self) -> bool {
        self.lock().timeout_triggered
    }

    pub fn response(&self) -> Option<ApiGatewayResponse> {
        self.lock().response.clone()
    }

    /// Fetches `name`, stores it under its short name (the segment after the
    /// last `/`) and enrolls every leaf string for redaction.
    pub async fn fetch_secret(&self, name: &str) -> Result<Value, CollaboratorError> {
        let payload = self.collaborators.secrets.fetch_secret(name).await?;
        let value = payload.into_value();
        if value.as_str().is_some_and(str::is_empty) {
            return Err(CollaboratorError::EmptySecret(name.to_string()));
        }

        let mut tokens = Vec::new();
        collect_leaf_strings(&value, &mut tokens);
        let short_name = short_secret_name(name).to_string();
        let stored = value.clone();
        self.write("secret", |state| {
            state.data_to_omit.extend(tokens);
            state.secrets.insert(short_name, stored);
        });
        debug!(secret = name, "secret fetched");
        Ok(value)
    }

    pub async fn get_record(
        &self,
        table: &str,
        partition_key: &str,
        sort_key: &str,
    ) -> Result<Option<Attributes>, CollaboratorError> {
        self.collaborators
            .tables
            .get_record(table, partition_key, sort_key)
            .await
    }

    pub async fn put_record(
        &self,
        table: &str,
        partition_key: &str,
        sort_key: &str,
        attributes: Attributes,
    ) -> Result<WriteAck, CollaboratorError> {
        self.collaborators
            .tables
            .put_record(table, partition_key, sort_key, attributes)
            .await
    }

    pub async fn outbound_request(
        &self,
        url: &str,
        method: HttpMethod,
    ) -> Result<String, CollaboratorError> {
        self.collaborators.http.outbound_request(url, method).await
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("request_id", &self.request_id())
            .finish_non_exhaustive()
    }
}

/// Decodes the event body. Only objects and arrays count as JSON bodies;
/// anything else keeps the raw value.
pub fn parse_body(event: &Value) -> (Value, bool) {
    let raw = event.get("body").cloned().unwrap_or(Value::Null);
    match &raw {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(decoded) if decoded.is_object() || decoded.is_array() => (decoded, true),
            _ => (raw, false),
        },
        Value::Object(_) | Value::Array(_) => (raw, true),
        _ => (raw, false),
    }
}

/// Reads the method from REST (`httpMethod`) or HTTP API (`requestContext.http.method`) events.
pub fn http_method(event: &Value) -> Option<&str> {
    event
        .get("httpMethod")
        .and_then(Value::as_str)
        .or_else(|| event.pointer("/requestContext/http/method").and_then(Value::as_str))
}

fn short_secret_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn collect_leaf_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) if !text.is_empty() => out.push(text.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_leaf_strings(item, out)),
        Value::Object(object) => object
            .values()
            .for_each(|item| collect_leaf_strings(item, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn string_body_with_object_is_json() {
        let (body, is_json) = parse_body(&json!({"body": "{\"a\":1}"}));
        assert!(is_json);
        assert_eq!(body, json!({"a": 1}));
    }

    #[test]
    fn scalar_json_body_is_not_json() {
        let (body, is_json) = parse_body(&json!({"body": "42"}));
        assert!(!is_json);
        assert_eq!(body, json!("42"));
    }

    #[test]
    fn malformed_body_falls_back_to_raw() {
        let (body, is_json) = parse_body(&json!({"body": "{not json"}));
        assert!(!is_json);
        assert_eq!(body, json!("{not json"));
    }

    #[test]
    fn structured_body_is_json() {
        let (body, is_json) = parse_body(&json!({"body": [1, 2]}));
        assert!(is_json);
        assert_eq!(body, json!([1, 2]));

        let (missing, is_json) = parse_body(&json!({"httpMethod": "GET"}));
        assert!(!is_json);
        assert_eq!(missing, Value::Null);
    }

    #[test]
    fn method_is_read_from_rest_and_http_api_events() {
        assert_eq!(http_method(&json!({"httpMethod": "OPTIONS"})), Some("OPTIONS"));
        assert_eq!(
            http_method(&json!({"requestContext": {"http": {"method": "POST"}}})),
            Some("POST")
        );
        assert_eq!(http_method(&json!({})), None);
    }

    #[test]
    fn short_name_is_last_path_segment() {
        assert_eq!(short_secret_name("prod/payments/stripe"), "stripe");
        assert_eq!(short_secret_name("standalone"), "standalone");
    }

    #[test]
    fn leaf_strings_are_collected_recursively() {
        let mut tokens = Vec::new();
        collect_leaf_strings(
            &json!({"user": "svc", "nested": {"list": ["a", "", 3]}, "port": 5432}),
            &mut tokens,
        );
        assert_eq!(tokens, vec!["svc".to_string(), "a".to_string()]);
    }

    #[test]
    fn sealed_state_drops_writes() {
        let context = InvocationContext::new(
            InvocationState::new(json!({}), None, Vec::new()),
            Collaborators::unavailable(),
        );
        context.add_to_log("before", 1);
        context.with_state(InvocationState::seal);
        context.add_to_log("after", 2);
        context.omit("late-secret");

        assert_eq!(context.log_entry("before"), Some(json!(1)));
        assert_eq!(context.log_entry("after"), None);
        assert!(context.with_state(|state| state.data_to_omit.is_empty()));
    }
}
