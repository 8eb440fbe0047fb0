use std::sync::Arc;

use invocation_lambda::config::RuntimeSettings;
use invocation_lambda::runtime::{build_executor, handle_event};
use invocation_lambda::telemetry::init_tracing;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing()?;

    let settings = RuntimeSettings::from_env()?;
    let executor = Arc::new(build_executor(settings).await?);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let executor = Arc::clone(&executor);
        async move { handle_event(&executor, event).await }
    }))
    .await
}
