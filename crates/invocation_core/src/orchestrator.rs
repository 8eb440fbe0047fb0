//! Per-invocation lifecycle: validation, the handler/deadline race and the
//! finalize pipeline (metadata, post hook, redaction, log emission).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::collaborators::{Collaborators, HttpMethod, LogSink};
use crate::context::{self, InvocationContext, InvocationState};
use crate::error::HandlerError;
use crate::redact;
use crate::responses::{self, ApiGatewayResponse};
use crate::timers::{RUN_EXECUTION, TOTAL_EXECUTION};
use crate::validation::{self, PayloadRule};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEOUT_OFFSET: Duration = Duration::from_millis(500);
pub const METADATA_ENTRY: &str = "metadata";
pub const VALIDATION_ENTRY: &str = "payloadValidation";

/// User code run for each invocation.
///
/// Any `Fn(InvocationContext) -> impl Future<Output = Result<..>>` closure is a
/// handler. Handlers run on their own task: a handler that misses the deadline
/// keeps running to completion, but its result is discarded.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, context: InvocationContext)
        -> Result<ApiGatewayResponse, HandlerError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ApiGatewayResponse, HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        context: InvocationContext,
    ) -> Result<ApiGatewayResponse, HandlerError> {
        (self)(context).await
    }
}

/// Hook run during finalize, after metadata is attached and before redaction.
pub type PostHook = Arc<dyn Fn(&InvocationContext) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Time budget for the whole invocation.
    pub timeout: Duration,
    /// Reserved for finalize; the deadline fires at `timeout - timeout_offset`.
    pub timeout_offset: Duration,
    pub required_payload_keys: Vec<PayloadRule>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            timeout_offset: DEFAULT_TIMEOUT_OFFSET,
            required_payload_keys: Vec::new(),
        }
    }
}

/// Per-invocation inputs that come from the platform rather than the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationOptions {
    pub request_id: Option<String>,
    /// Overrides [`ExecutionConfig::timeout`], e.g. with the platform's remaining time.
    pub timeout: Option<Duration>,
}

/// Result of one invocation: the redacted response, the redacted log that was
/// emitted, and whether the deadline won.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationReport {
    pub response: ApiGatewayResponse,
    pub log: Value,
    pub timeout_triggered: bool,
}

/// Process-lifetime wiring: configuration, collaborators, handler and sink.
pub struct Executor {
    config: ExecutionConfig,
    collaborators: Collaborators,
    handler: Arc<dyn Handler>,
    sink: Arc<dyn LogSink>,
    post_hook: Option<PostHook>,
}

impl Executor {
    pub fn new(
        config: ExecutionConfig,
        collaborators: Collaborators,
        handler: impl Handler,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            config,
            collaborators,
            handler: Arc::new(handler),
            sink,
            post_hook: None,
        }
    }

    pub fn with_post_hook(
        mut self,
        hook: impl Fn(&InvocationContext) + Send + Sync + 'static,
    ) -> Self {
        self.post_hook = Some(Arc::new(hook));
        self
    }

    pub async fn invoke(&self, event: Value) -> InvocationReport {
        self.invoke_with(event, InvocationOptions::default()).await
    }

    pub async fn invoke_with(&self, event: Value, options: InvocationOptions) -> InvocationReport {
        Orchestrator::new(self, event, options).main().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Validating,
    Racing,
    Finalized,
}

/// Owns one invocation from event to response. `finalize` consumes the
/// orchestrator, so it runs exactly once.
pub struct Orchestrator<'a> {
    executor: &'a Executor,
    context: InvocationContext,
    phase: Phase,
    started_at: Instant,
    timeout: Duration,
}

impl<'a> Orchestrator<'a> {
    pub fn new(executor: &'a Executor, event: Value, options: InvocationOptions) -> Self {
        let state = InvocationState::new(
            event,
            options.request_id,
            executor.config.required_payload_keys.clone(),
        );
        Self {
            executor,
            context: InvocationContext::new(state, executor.collaborators.clone()),
            phase: Phase::Created,
            started_at: Instant::now(),
            timeout: options.timeout.unwrap_or(executor.config.timeout),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub async fn main(mut self) -> InvocationReport {
        self.enter(Phase::Validating);
        self.context.start_timer(TOTAL_EXECUTION);

        if self.is_preflight() {
            self.set_response(responses::preflight());
            return self.finalize();
        }

        let outcome = self.context.with_state(|state| {
            validation::check_required_payload_keys(
                &state.parsed_body,
                state.is_body_json,
                &state.required_payload_keys,
            )
        });
        if !outcome.is_all_required_payload_keys_present {
            debug!(message = %outcome.message, "payload validation failed");
            let response = responses::bad_request(json!({}), &outcome.message);
            self.context.add_to_log(VALIDATION_ENTRY, &outcome);
            self.set_response(response);
            return self.finalize();
        }

        self.enter(Phase::Racing);
        let response = self.race().await;
        self.set_response(response);
        self.finalize()
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "invocation phase");
        self.phase = phase;
    }

    fn is_preflight(&self) -> bool {
        self.context
            .with_state(|state| context::http_method(&state.raw_event).map(str::to_string))
            .and_then(|method| method.parse::<HttpMethod>().ok())
            == Some(HttpMethod::Options)
    }

    fn set_response(&self, response: ApiGatewayResponse) {
        self.context
            .with_state(|state| state.response = Some(response));
    }

    fn deadline(&self) -> Instant {
        self.started_at
            + self
                .timeout
                .saturating_sub(self.executor.config.timeout_offset)
    }

    async fn race(&self) -> ApiGatewayResponse {
        let deadline = self.deadline();
        self.context.start_timer(RUN_EXECUTION);

        let handler = Arc::clone(&self.executor.handler);
        let handler_context = self.context.clone();
        let mut task = tokio::spawn(async move { handler.handle(handler_context).await });

        let settled = tokio::select! {
            biased;
            joined = &mut task => Some(joined),
            () = tokio::time::sleep_until(deadline) => None,
        };

        match settled {
            Some(joined) => {
                self.context.stop_timer(RUN_EXECUTION);
                match joined {
                    Ok(Ok(response)) => response,
                    Ok(Err(error)) => self.capture_error(error),
                    Err(join_error) => self.capture_error(join_failure(join_error)),
                }
            }
            None => {
                // Dropping the join handle detaches the task; the handler is not cancelled.
                drop(task);
                self.context.with_state(|state| state.timeout_triggered = true);
                self.context.stop_timer_with_note(RUN_EXECUTION, "timed out");
                let timeout_ms = self.timeout.as_millis();
                let timeout_offset_ms = self.executor.config.timeout_offset.as_millis();
                warn!(timeout_ms, timeout_offset_ms, "handler exceeded deadline");
                responses::timeout_error()
            }
        }
    }

    fn capture_error(&self, error: HandlerError) -> ApiGatewayResponse {
        warn!(error = %error, "handler failed");
        self.context
            .with_state(|state| state.log.add_error(&error));
        responses::generic_internal_server_error()
    }

    fn metadata(&self) -> Value {
        self.context.with_state(|state| {
            let total = state.timers.duration_ms(TOTAL_EXECUTION);
            let run = state.timers.duration_ms(RUN_EXECUTION);
            let overhead = total.map(|total| total.saturating_sub(run.unwrap_or(0)));
            json!({
                "requestId": state.request_id,
                "httpMethod": context::http_method(&state.raw_event),
                "isBodyJson": state.is_body_json,
                "timeoutTriggered": state.timeout_triggered,
                "timeoutMs": duration_ms(self.timeout),
                "timeoutOffsetMs": duration_ms(self.executor.config.timeout_offset),
                "timers": state.timers,
                "orchestratorOverheadMs": overhead,
                "secretsLoaded": state.secrets.keys().collect::<Vec<_>>(),
            })
        })
    }

    fn finalize(mut self) -> InvocationReport {
        self.enter(Phase::Finalized);
        self.context.stop_timer(TOTAL_EXECUTION);
        let metadata = self.metadata();
        self.context.add_to_log(METADATA_ENTRY, metadata);

        if let Some(hook) = &self.executor.post_hook {
            hook(&self.context);
        }

        let (response, log, timeout_triggered) = self.context.with_state(|state| {
            let response = state
                .response
                .take()
                .unwrap_or_else(responses::generic_internal_server_error);
            let response = redact::redact_response(&response, &state.data_to_omit);
            state.log.add_response(&response);
            let log = redact::redact_value(&state.log.to_value(), &state.data_to_omit);
            state.response = Some(response.clone());
            state.seal();
            (response, log, state.timeout_triggered)
        });

        self.executor.sink.emit(&log);
        info!(
            request_id = self.context.request_id().as_deref().unwrap_or_default(),
            status_code = response.status_code,
            timeout_triggered,
            "invocation finalized"
        );

        InvocationReport {
            response,
            log,
            timeout_triggered,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn join_failure(error: JoinError) -> HandlerError {
    if error.is_panic() {
        HandlerError::from_panic(error.into_panic())
    } else {
        HandlerError::named("Cancelled", error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingSink;

    fn executor(config: ExecutionConfig, handler: impl Handler) -> Executor {
        Executor::new(
            config,
            Collaborators::unavailable(),
            handler,
            Arc::new(RecordingSink::default()),
        )
    }

    #[test]
    fn deadline_subtracts_offset_and_saturates() {
        let config = ExecutionConfig {
            timeout: Duration::from_millis(200),
            timeout_offset: Duration::from_millis(500),
            required_payload_keys: Vec::new(),
        };
        let executor = executor(config, |_context: InvocationContext| async {
            Ok::<_, HandlerError>(responses::success(json!({}), ""))
        });

        let orchestrator = Orchestrator::new(&executor, json!({}), InvocationOptions::default());
        assert_eq!(orchestrator.deadline(), orchestrator.started_at);
        assert_eq!(orchestrator.phase(), Phase::Created);
    }

    #[test]
    fn per_invocation_timeout_overrides_config() {
        let executor = executor(ExecutionConfig::default(), |_context: InvocationContext| async {
            Ok::<_, HandlerError>(responses::success(json!({}), ""))
        });

        let orchestrator = Orchestrator::new(
            &executor,
            json!({}),
            InvocationOptions {
                request_id: Some("req-1".to_string()),
                timeout: Some(Duration::from_millis(1_500)),
            },
        );
        assert_eq!(
            orchestrator.deadline() - orchestrator.started_at,
            Duration::from_millis(1_000)
        );
    }

    #[tokio::test]
    async fn panicking_handler_is_captured() {
        let executor = executor(ExecutionConfig::default(), |_context: InvocationContext| async {
            if true {
                panic!("handler exploded");
            }
            Ok::<_, HandlerError>(responses::success(json!({}), ""))
        });

        let report = executor.invoke(json!({"httpMethod": "GET"})).await;

        assert_eq!(report.response.status_code, 500);
        assert_eq!(report.log["Error"]["name"], "Panic");
        assert_eq!(report.log["Error"]["message"], "handler exploded");
    }
}
