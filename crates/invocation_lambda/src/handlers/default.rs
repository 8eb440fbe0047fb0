//! Handler used when a deployment ships no function of its own: loads the
//! configured secrets, probes an outbound endpoint and echoes what it saw.

use async_trait::async_trait;
use invocation_core::responses::{self, ApiGatewayResponse};
use invocation_core::{Handler, HandlerError, HttpMethod, InvocationContext};
use serde_json::json;

pub const PROBE_TIMER: &str = "probe";
pub const PROBE_LOG_ENTRY: &str = "probe";

#[derive(Debug, Clone)]
pub struct DefaultHandler {
    preload_secrets: Vec<String>,
    probe_url: String,
}

impl DefaultHandler {
    pub fn new(preload_secrets: Vec<String>, probe_url: impl Into<String>) -> Self {
        Self {
            preload_secrets,
            probe_url: probe_url.into(),
        }
    }
}

#[async_trait]
impl Handler for DefaultHandler {
    async fn handle(
        &self,
        context: InvocationContext,
    ) -> Result<ApiGatewayResponse, HandlerError> {
        for name in &self.preload_secrets {
            context.fetch_secret(name).await?;
        }

        context.start_timer(PROBE_TIMER);
        let body = context
            .outbound_request(&self.probe_url, HttpMethod::Get)
            .await?;
        context.stop_timer(PROBE_TIMER);

        let ip = body.trim();
        context.add_to_log(
            PROBE_LOG_ENTRY,
            json!({
                "url": self.probe_url,
                "durationMs": context.timer_duration_ms(PROBE_TIMER),
            }),
        );

        Ok(responses::success(json!({ "ip": ip }), "Outbound probe succeeded"))
    }
}
