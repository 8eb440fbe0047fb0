use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::HandlerError;
use crate::responses::ApiGatewayResponse;

pub const RESPONSE_ENTRY: &str = "responseObject";
pub const ERROR_ENTRY: &str = "Error";

/// Named entries accumulated during one invocation.
///
/// Re-adding a name replaces its value but keeps the position of the first
/// insertion, so the emitted log reads in the order entries were introduced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StructuredLog {
    entries: Map<String, Value>,
}

impl StructuredLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, body: impl Serialize) {
        let body = serde_json::to_value(body)
            .unwrap_or_else(|error| Value::String(format!("unserializable log entry: {error}")));
        self.entries.insert(name.into(), body);
    }

    pub fn add_response(&mut self, response: &ApiGatewayResponse) {
        self.add(RESPONSE_ENTRY, response);
    }

    pub fn add_error(&mut self, error: &HandlerError) {
        self.add(ERROR_ENTRY, error);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.clone())
    }
}
