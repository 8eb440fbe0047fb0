mod support;

use invocation_core::responses;
use invocation_core::{HttpMethod, InvocationContext};
use serde_json::json;
use support::{body, config, ok, Harness, SECRET_NAME};

const API_KEY: &str = "sk-live-4f9a";

#[tokio::test(start_paused = true)]
async fn fetched_secrets_never_reach_response_or_log() {
    let harness = Harness::new();
    let executor = harness.executor(
        config(3_000, 500, Vec::new()),
        |context: InvocationContext| async move {
            let secret = context.fetch_secret(SECRET_NAME).await?;
            let api_key = secret["apiKey"].clone();
            let header = format!("Bearer {}", api_key.as_str().unwrap_or_default());
            context.add_to_log("outboundAuth", json!({ "header": header }));
            ok(responses::success(json!({"echo": api_key}), "loaded"))
        },
    );

    let report = executor.invoke(json!({"httpMethod": "GET"})).await;

    assert_eq!(report.response.status_code, 200);
    assert!(!report.response.body.contains(API_KEY));
    assert_eq!(body(&report.response)["echo"], "****");

    let emitted = report.log.to_string();
    assert!(!emitted.contains(API_KEY));
    assert!(!emitted.contains("eu-west-1"));
    assert_eq!(report.log["outboundAuth"]["header"], "Bearer ****");
    assert_eq!(report.log["metadata"]["secretsLoaded"], json!(["credentials"]));
}

#[tokio::test(start_paused = true)]
async fn secrets_are_stored_under_short_name() {
    let harness = Harness::new();
    let executor = harness.executor(
        config(3_000, 500, Vec::new()),
        |context: InvocationContext| async move {
            context.fetch_secret(SECRET_NAME).await?;
            let region = context
                .secret("credentials")
                .map(|secret| secret["region"].clone())
                .unwrap_or_default();
            ok(responses::success(json!({"hasRegion": !region.is_null()}), "ok"))
        },
    );

    let report = executor.invoke(json!({"httpMethod": "GET"})).await;

    assert_eq!(body(&report.response)["hasRegion"], true);
}

#[tokio::test(start_paused = true)]
async fn manually_omitted_values_are_masked_in_echoed_input() {
    let harness = Harness::new();
    let executor = harness.executor(
        config(3_000, 500, Vec::new()),
        |context: InvocationContext| async move {
            let body = context.parsed_body();
            if let Some(card) = body["card"].as_str() {
                context.omit(card);
            }
            context.add_to_log("request", &body);
            ok(responses::success(json!({"received": body}), "stored"))
        },
    );

    let report = executor
        .invoke(json!({"httpMethod": "POST", "body": "{\"card\":\"4111111111111111\",\"qty\":2}"}))
        .await;

    let response_body = body(&report.response);
    assert_eq!(response_body["received"]["card"], "****");
    assert_eq!(response_body["received"]["qty"], 2);
    assert_eq!(report.log["request"]["card"], "****");
    assert!(!report.log.to_string().contains("4111111111111111"));
}

#[tokio::test(start_paused = true)]
async fn post_hook_runs_before_redaction_with_final_response() {
    let harness = Harness::new();
    let executor = harness
        .executor(
            config(3_000, 500, Vec::new()),
            |context: InvocationContext| async move {
                context.fetch_secret(SECRET_NAME).await?;
                ok(responses::success(json!({}), "ok"))
            },
        )
        .with_post_hook(|context| {
            let status = context.response().map(|response| response.status_code);
            context.add_to_log("audit", json!({"status": status, "key": API_KEY}));
        });

    let report = executor.invoke(json!({"httpMethod": "GET"})).await;

    assert_eq!(report.log["audit"]["status"], 200);
    assert_eq!(report.log["audit"]["key"], "****");
}

#[tokio::test(start_paused = true)]
async fn outbound_requests_go_through_injected_fetcher() {
    let harness = Harness::new();
    let executor = harness.executor(
        config(3_000, 500, Vec::new()),
        |context: InvocationContext| async move {
            let text = context
                .outbound_request("http://checkip.amazonaws.com/", HttpMethod::Get)
                .await?;
            ok(responses::success(json!({"ip": text.trim()}), "ok"))
        },
    );

    let report = executor.invoke(json!({"httpMethod": "GET"})).await;

    assert_eq!(body(&report.response)["ip"], "203.0.113.7");
    assert_eq!(
        harness.http.calls(),
        vec![("http://checkip.amazonaws.com/".to_string(), HttpMethod::Get)]
    );
}

#[tokio::test(start_paused = true)]
async fn table_records_round_trip_through_context() {
    let harness = Harness::new();
    let executor = harness.executor(
        config(3_000, 500, Vec::new()),
        |context: InvocationContext| async move {
            let attributes = serde_json::Map::from_iter([("visits".to_string(), json!(3))]);
            let ack = context
                .put_record("profiles", "user#7", "summary", attributes)
                .await?;
            let record = context.get_record("profiles", "user#7", "summary").await?;
            ok(responses::success(json!({"ack": ack, "record": record}), "ok"))
        },
    );

    let report = executor.invoke(json!({"httpMethod": "GET"})).await;

    let response_body = body(&report.response);
    assert_eq!(response_body["ack"]["partitionKey"], "user#7");
    assert_eq!(response_body["record"]["visits"], 3);
}

#[tokio::test(start_paused = true)]
async fn literal_valued_secret_leaves_response_body_parseable() {
    let harness = Harness::new().with_secret("prod/db/settings", r#"{"ssl":"true","port":"5432"}"#);
    let executor = harness.executor(
        config(3_000, 500, Vec::new()),
        |context: InvocationContext| async move {
            context.fetch_secret("prod/db/settings").await?;
            ok(responses::success(json!({"ok": true, "port": 5432}), "connected"))
        },
    );

    let report = executor.invoke(json!({"httpMethod": "GET"})).await;

    let response_body = report
        .response
        .body_json()
        .expect("redacted body should stay json");
    assert_eq!(response_body["ok"], true);
    assert_eq!(response_body["port"], 5432);
    assert_eq!(report.response.body_type().as_deref(), Some("Response"));
    assert_eq!(report.log["metadata"]["secretsLoaded"], json!(["settings"]));
}
