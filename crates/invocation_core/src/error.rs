use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Failure reported by a handler, captured into the log before the caller
/// gets a generic server error.
///
/// Every field is optional so partially described failures (a bare panic
/// payload, an error without a source chain) are still recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cause: Vec<String>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            message: Some(message.into()),
            stack: captured_stack(),
            cause: Vec::new(),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause.push(cause.into());
        self
    }

    /// Builds a record from a panic payload, which is usually a `&str` or `String`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| text.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned());
        Self {
            name: Some("Panic".to_string()),
            message,
            stack: None,
            cause: Vec::new(),
        }
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.message) {
            (Some(name), Some(message)) => write!(f, "{name}: {message}"),
            (Some(name), None) => f.write_str(name),
            (None, Some(message)) => f.write_str(message),
            (None, None) => f.write_str("handler failed"),
        }
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        let mut cause = Vec::new();
        let mut source = error.source();
        while let Some(inner) = source {
            cause.push(inner.to_string());
            source = inner.source();
        }

        Self {
            name: Some(short_type_name::<E>().to_string()),
            message: Some(error.to_string()),
            stack: captured_stack(),
            cause,
        }
    }
}

/// Errors raised by secret, table and outbound collaborators.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("secret `{name}` could not be retrieved: {message}")]
    Secret { name: String, message: String },
    #[error("secret `{0}` has no value")]
    EmptySecret(String),
    #[error("table `{table}` request failed: {message}")]
    Table { table: String, message: String },
    #[error("outbound {method} request to `{url}` failed: {message}")]
    Outbound {
        url: String,
        method: String,
        message: String,
    },
    #[error("{collaborator} is not configured for this runtime")]
    Unavailable { collaborator: &'static str },
}

// Empty unless RUST_BACKTRACE/RUST_LIB_BACKTRACE enables capture.
fn captured_stack() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("query failed")]
    struct QueryError {
        #[source]
        source: std::io::Error,
    }

    #[test]
    fn converts_std_errors_with_source_chain() {
        let error = QueryError {
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timed out"),
        };

        let captured = HandlerError::from(error);

        assert_eq!(captured.name.as_deref(), Some("QueryError"));
        assert_eq!(captured.message(), "query failed");
        assert_eq!(captured.cause, vec!["socket timed out".to_string()]);
    }

    #[test]
    fn question_mark_converts_collaborator_errors() {
        fn run() -> Result<(), HandlerError> {
            Err(CollaboratorError::EmptySecret("prod/api".to_string()))?;
            Ok(())
        }

        let error = run().expect_err("should fail");
        assert_eq!(error.name.as_deref(), Some("CollaboratorError"));
        assert_eq!(error.message(), "secret `prod/api` has no value");
    }

    #[test]
    fn panic_payloads_keep_their_message() {
        let from_str = HandlerError::from_panic(Box::new("index out of bounds"));
        let from_string = HandlerError::from_panic(Box::new(String::from("bad state")));
        let opaque = HandlerError::from_panic(Box::new(42_u8));

        assert_eq!(from_str.message(), "index out of bounds");
        assert_eq!(from_string.message(), "bad state");
        assert_eq!(opaque.message, None);
        assert_eq!(opaque.to_string(), "Panic");
    }

    #[test]
    fn serializes_only_populated_fields() {
        let error = HandlerError {
            name: None,
            message: Some("partial".to_string()),
            stack: None,
            cause: Vec::new(),
        };

        let value = serde_json::to_value(&error).expect("error should serialize");
        assert_eq!(value, serde_json::json!({"message": "partial"}));
    }
}
