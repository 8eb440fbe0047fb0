//! Wiring between the Lambda runtime and the invocation executor.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use invocation_core::responses::ApiGatewayResponse;
use invocation_core::{Collaborators, Executor, InvocationOptions, TracingLogSink};
use lambda_runtime::LambdaEvent;
use serde_json::Value;
use tracing::info;

use crate::adapters::http::ReqwestFetcher;
use crate::adapters::secrets::SecretsManagerStore;
use crate::adapters::table::DynamoTableStore;
use crate::config::{ConfigError, RuntimeSettings};
use crate::handlers::default::DefaultHandler;

/// Builds the process-lifetime executor: AWS clients are created once and
/// shared by every invocation.
pub async fn build_executor(settings: RuntimeSettings) -> Result<Executor, ConfigError> {
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let collaborators = Collaborators::new(
        Arc::new(SecretsManagerStore::new(aws_sdk_secretsmanager::Client::new(
            &aws_config,
        ))),
        Arc::new(DynamoTableStore::new(
            aws_sdk_dynamodb::Client::new(&aws_config),
            settings.partition_key_attribute,
            settings.sort_key_attribute,
        )),
        Arc::new(ReqwestFetcher::new(settings.outbound_timeout)?),
    );

    let timeout_ms = millis(settings.execution.timeout);
    let timeout_offset_ms = millis(settings.execution.timeout_offset);
    info!(
        timeout_ms,
        timeout_offset_ms,
        required_rules = settings.execution.required_payload_keys.len(),
        preload_secrets = settings.preload_secrets.len(),
        "executor configured"
    );

    Ok(Executor::new(
        settings.execution,
        collaborators,
        DefaultHandler::new(settings.preload_secrets, settings.probe_url),
        Arc::new(TracingLogSink),
    ))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Per-invocation options from the Lambda context. The remaining time until
/// `deadline_ms` (epoch millis) replaces the configured timeout; a zero
/// deadline means the platform supplied none.
pub fn invocation_options(
    request_id: &str,
    deadline_ms: u64,
    now: DateTime<Utc>,
) -> InvocationOptions {
    let timeout = (deadline_ms > 0).then(|| {
        let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        Duration::from_millis(deadline_ms.saturating_sub(now_ms))
    });

    InvocationOptions {
        request_id: (!request_id.is_empty()).then(|| request_id.to_string()),
        timeout,
    }
}

pub async fn handle_event(
    executor: &Executor,
    event: LambdaEvent<Value>,
) -> Result<ApiGatewayResponse, lambda_runtime::Error> {
    let (payload, context) = event.into_parts();
    let options = invocation_options(&context.request_id, context.deadline, Utc::now());
    let report = executor.invoke_with(payload, options).await;
    Ok(report.response)
}
