//! Narrow interfaces to the systems a handler talks to.
//!
//! Implementations live with the runtime (AWS SDK clients, HTTP clients) and
//! are injected once per process through [`Collaborators`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CollaboratorError;

pub type Attributes = Map<String, Value>;

/// Raw secret material as returned by the secret store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretPayload {
    Text(String),
    Binary(Vec<u8>),
}

impl SecretPayload {
    /// Decodes structured secrets; plain text stays a JSON string. Binary
    /// payloads are decoded as UTF-8 text when possible, otherwise kept as
    /// a byte array. A byte array has no string leaves, so it contributes no
    /// redaction tokens; handlers must `omit` any rendering of it they log.
    pub fn into_value(self) -> Value {
        match self {
            Self::Text(text) => decode_text(text),
            Self::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => decode_text(text),
                Err(error) => Value::from(error.into_bytes()),
            },
        }
    }
}

fn decode_text(text: String) -> Value {
    match serde_json::from_str::<Value>(&text) {
        Ok(decoded @ (Value::Object(_) | Value::Array(_))) => decoded,
        _ => Value::String(text),
    }
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn fetch_secret(&self, name: &str) -> Result<SecretPayload, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteAck {
    pub table: String,
    pub partition_key: String,
    pub sort_key: String,
}

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn get_record(
        &self,
        table: &str,
        partition_key: &str,
        sort_key: &str,
    ) -> Result<Option<Attributes>, CollaboratorError>;

    async fn put_record(
        &self,
        table: &str,
        partition_key: &str,
        sort_key: &str,
        attributes: Attributes,
    ) -> Result<WriteAck, CollaboratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            other => Err(format!("unsupported http method: {other}")),
        }
    }
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn outbound_request(
        &self,
        url: &str,
        method: HttpMethod,
    ) -> Result<String, CollaboratorError>;
}

/// Destination of the redacted per-invocation log.
pub trait LogSink: Send + Sync {
    fn emit(&self, log: &Value);
}

/// Writes each invocation log as one `info` event on the `invocation_log` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn emit(&self, log: &Value) {
        tracing::info!(target: "invocation_log", log = %log, "invocation completed");
    }
}

/// Collaborator handles shared by every invocation of a process.
#[derive(Clone)]
pub struct Collaborators {
    pub secrets: Arc<dyn SecretStore>,
    pub tables: Arc<dyn TableStore>,
    pub http: Arc<dyn HttpFetcher>,
}

impl Collaborators {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        tables: Arc<dyn TableStore>,
        http: Arc<dyn HttpFetcher>,
    ) -> Self {
        Self {
            secrets,
            tables,
            http,
        }
    }

    /// Handles that fail every call, for functions that need no collaborators.
    pub fn unavailable() -> Self {
        let unavailable = Arc::new(Unavailable);
        Self {
            secrets: unavailable.clone(),
            tables: unavailable.clone(),
            http: unavailable,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

struct Unavailable;

#[async_trait]
impl SecretStore for Unavailable {
    async fn fetch_secret(&self, _name: &str) -> Result<SecretPayload, CollaboratorError> {
        Err(CollaboratorError::Unavailable {
            collaborator: "secret store",
        })
    }
}

#[async_trait]
impl TableStore for Unavailable {
    async fn get_record(
        &self,
        _table: &str,
        _partition_key: &str,
        _sort_key: &str,
    ) -> Result<Option<Attributes>, CollaboratorError> {
        Err(CollaboratorError::Unavailable {
            collaborator: "table store",
        })
    }

    async fn put_record(
        &self,
        _table: &str,
        _partition_key: &str,
        _sort_key: &str,
        _attributes: Attributes,
    ) -> Result<WriteAck, CollaboratorError> {
        Err(CollaboratorError::Unavailable {
            collaborator: "table store",
        })
    }
}

#[async_trait]
impl HttpFetcher for Unavailable {
    async fn outbound_request(
        &self,
        _url: &str,
        _method: HttpMethod,
    ) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Unavailable {
            collaborator: "outbound http",
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn structured_secret_text_is_decoded() {
        let payload = SecretPayload::Text("{\"user\":\"svc\",\"password\":\"pw\"}".to_string());
        assert_eq!(payload.into_value(), json!({"user": "svc", "password": "pw"}));
    }

    #[test]
    fn scalar_secret_text_stays_a_string() {
        assert_eq!(SecretPayload::Text("1234".to_string()).into_value(), json!("1234"));
        assert_eq!(SecretPayload::Text("plain".to_string()).into_value(), json!("plain"));
    }

    #[test]
    fn binary_secrets_decode_when_utf8() {
        assert_eq!(
            SecretPayload::Binary(b"{\"k\":\"v\"}".to_vec()).into_value(),
            json!({"k": "v"})
        );
        assert_eq!(
            SecretPayload::Binary(vec![0xff, 0x01]).into_value(),
            json!([255, 1])
        );
    }

    #[test]
    fn parses_methods_case_insensitively() {
        assert_eq!("options".parse::<HttpMethod>(), Ok(HttpMethod::Options));
        assert_eq!(" Get ".parse::<HttpMethod>(), Ok(HttpMethod::Get));
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[tokio::test]
    async fn unavailable_collaborators_fail_each_call() {
        let collaborators = Collaborators::unavailable();

        let error = collaborators
            .secrets
            .fetch_secret("prod/key")
            .await
            .expect_err("secret store should be unavailable");
        assert_eq!(error.to_string(), "secret store is not configured for this runtime");

        assert!(collaborators
            .http
            .outbound_request("http://example.invalid", HttpMethod::Get)
            .await
            .is_err());
    }
}
