use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const GENERIC_ERROR_MESSAGE: &str = "An error has occurred";
pub const TIMEOUT_MESSAGE: &str = "Request timed out";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

impl ApiGatewayResponse {
    /// Decodes the body, returning `None` when a handler produced a non-JSON body.
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    pub fn body_type(&self) -> Option<String> {
        self.body_json()?
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Discriminator carried in every body under `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    Response,
    Error,
    Preflight,
}

impl BodyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Response => "Response",
            Self::Error => "Error",
            Self::Preflight => "Preflight",
        }
    }
}

pub fn basic_response_headers() -> Value {
    json!({
        "Access-Control-Allow-Headers": "Content-Type, X-Api-Key, Authorization",
        "Access-Control-Allow-Origin": "*",
        "Access-Control-Allow-Methods": "POST, OPTIONS, PUT, GET, DELETE",
    })
}

/// Serializes the caller payload merged with `type` and `message`.
///
/// Object payloads are merged key by key and `type`/`message` always win.
/// `null` contributes nothing; any other payload is nested under `data`.
pub fn body_object(payload: Value, body_type: BodyType, message: &str) -> String {
    let mut object = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => Map::from_iter([("data".to_string(), other)]),
    };
    object.insert("type".to_string(), Value::from(body_type.as_str()));
    object.insert("message".to_string(), Value::from(message));
    Value::Object(object).to_string()
}

pub fn success(payload: Value, message: &str) -> ApiGatewayResponse {
    envelope(200, payload, BodyType::Response, message)
}

pub fn bad_request(payload: Value, message: &str) -> ApiGatewayResponse {
    envelope(400, payload, BodyType::Error, message)
}

pub fn internal_server_error(payload: Value, message: &str) -> ApiGatewayResponse {
    envelope(500, payload, BodyType::Error, message)
}

pub fn generic_internal_server_error() -> ApiGatewayResponse {
    internal_server_error(json!({}), GENERIC_ERROR_MESSAGE)
}

pub fn timeout_error() -> ApiGatewayResponse {
    envelope(504, json!({}), BodyType::Error, TIMEOUT_MESSAGE)
}

pub fn preflight() -> ApiGatewayResponse {
    envelope(200, json!({}), BodyType::Preflight, "")
}

fn envelope(
    status_code: u16,
    payload: Value,
    body_type: BodyType,
    message: &str,
) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code,
        headers: basic_response_headers(),
        body: body_object(payload, body_type, message),
    }
}
