//! Invocation lifecycle primitives for event-triggered serverless functions.
//!
//! This crate owns request entry, payload validation, the handler/deadline race,
//! structured logging with redaction, and response shaping. It intentionally
//! excludes AWS SDK and Lambda runtime concerns: secret, table and network
//! access are reached only through the traits in [`collaborators`].

pub mod collaborators;
pub mod context;
pub mod error;
pub mod log;
pub mod orchestrator;
pub mod redact;
pub mod responses;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod timers;
pub mod validation;

pub use collaborators::{
    Attributes, Collaborators, HttpFetcher, HttpMethod, LogSink, SecretPayload, SecretStore,
    TableStore, TracingLogSink, WriteAck,
};
pub use context::InvocationContext;
pub use error::{CollaboratorError, HandlerError};
pub use orchestrator::{ExecutionConfig, Executor, Handler, InvocationOptions, InvocationReport};
pub use responses::ApiGatewayResponse;
pub use validation::PayloadRule;
