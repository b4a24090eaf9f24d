mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{config_set, config_state, options, sse_body, SDK_KEY};
use configdirector_client::{
    create_client, ClientError, ClientOptions, ClientReady, ConfigValue, ConfigsUpdated,
    ConnectAction, Context, TelemetryOptions,
};
use mockito::{Matcher, Server};
use serde_json::json;
use tokio::time::{sleep, Instant};

type Seen = Arc<Mutex<Vec<String>>>;

fn recorder() -> (Seen, impl Fn(&ConfigValue) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |value: &ConfigValue| {
        sink.lock().unwrap().push(value.to_string())
    })
}

async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() && Instant::now() < deadline {
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn streamed_full_set_updates_values_and_watchers() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/sse/v1")
        .match_header("accept", "text/event-stream")
        .match_body(Matcher::PartialJson(json!({
            "givenContext": { "id": "user-1" },
            "clientSdkKey": SDK_KEY
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[config_set(
            "full",
            &[config_state("greeting", "string", "Bye")],
        )]))
        .create_async()
        .await;

    let client = create_client(SDK_KEY, options(server.url(), true)).unwrap();
    let (seen, callback) = recorder();
    client.watch("greeting", "Hello", callback).unwrap();

    client
        .initialize(Some(Context::new().with_id("user-1")))
        .await;

    assert!(client.is_ready());
    assert_eq!(
        client.get_value("greeting", "Hello").unwrap(),
        ConfigValue::from("Bye")
    );
    assert_eq!(seen.lock().unwrap().first().map(String::as_str), Some("Bye"));
    client.dispose();
    mock.assert_async().await;
}

#[tokio::test]
async fn streamed_delta_only_notifies_watchers_of_its_keys() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/sse/v1")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[
            config_set(
                "full",
                &[
                    config_state("a", "string", "A1"),
                    config_state("b", "string", "B1"),
                ],
            ),
            config_set("delta", &[config_state("b", "string", "B2")]),
        ]))
        .create_async()
        .await;

    let client = create_client(SDK_KEY, options(server.url(), true)).unwrap();
    let (seen_a, on_a) = recorder();
    let (seen_b, on_b) = recorder();
    client.watch("a", "none", on_a).unwrap();
    client.watch("b", "none", on_b).unwrap();

    client.initialize(None).await;
    wait_until(|| seen_b.lock().unwrap().len() >= 2).await;
    client.close();

    assert_eq!(*seen_a.lock().unwrap(), vec!["A1"]);
    assert_eq!(*seen_b.lock().unwrap(), vec!["B1", "B2"]);
    assert_eq!(client.get_value("a", "none").unwrap(), ConfigValue::from("A1"));
    assert_eq!(client.get_value("b", "none").unwrap(), ConfigValue::from("B2"));
}

#[tokio::test]
async fn stream_that_never_answers_times_out_without_ready() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/sse/v1")
        .with_status(503)
        .create_async()
        .await;

    let client = create_client(
        SDK_KEY,
        options(server.url(), true).with_timeout(Duration::from_millis(200)),
    )
    .unwrap();

    let started = Instant::now();
    client.initialize(None).await;

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(!client.is_ready());
    assert_eq!(client.get_value("k", "fallback").unwrap(), ConfigValue::from("fallback"));
    client.close();
}

#[tokio::test]
async fn rejected_stream_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/sse/v1")
        .with_status(401)
        .with_body("unknown sdk key")
        .expect(1)
        .create_async()
        .await;

    let client = create_client(SDK_KEY, options(server.url(), true)).unwrap();
    let started = Instant::now();
    client.initialize(None).await;

    assert!(started.elapsed() < Duration::from_millis(1_500));
    assert!(!client.is_ready());
    sleep(Duration::from_millis(100)).await;
    mock.assert_async().await;
}

#[tokio::test]
async fn reads_before_any_payload_return_defaults() {
    let client = create_client(SDK_KEY, options("http://127.0.0.1:9".into(), false)).unwrap();

    assert!(!client.is_ready());
    assert_eq!(client.get_value("k", "Hello").unwrap(), ConfigValue::from("Hello"));
    assert_eq!(client.get_value("n", 5).unwrap(), ConfigValue::from(5));
    assert_eq!(client.get_value("b", true).unwrap(), ConfigValue::from(true));
}

#[tokio::test]
async fn pulled_empty_full_set_keeps_defaults() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/pull/v1")
        .with_status(200)
        .with_body(config_set("full", &[]).to_string())
        .create_async()
        .await;

    let client = create_client(SDK_KEY, options(server.url(), false)).unwrap();
    client.initialize(None).await;

    assert!(client.is_ready());
    assert_eq!(client.get_value("k", "Hello").unwrap(), ConfigValue::from("Hello"));
}

#[tokio::test]
async fn pull_rejection_disables_later_connects() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/pull/v1")
        .with_status(401)
        .with_body("unknown sdk key")
        .expect(1)
        .create_async()
        .await;

    let client = create_client(SDK_KEY, options(server.url(), false)).unwrap();
    client.initialize(None).await;
    assert!(!client.is_ready());

    client.update_context(Context::new().with_id("other")).await;
    assert!(!client.is_ready());
    mock.assert_async().await;
}

#[tokio::test]
async fn update_context_reconnects_with_the_new_context() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("POST", "/pull/v1")
        .match_body(Matcher::PartialJson(json!({ "givenContext": { "id": "1" } })))
        .with_status(200)
        .with_body(config_set("full", &[config_state("plan", "string", "free")]).to_string())
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("POST", "/pull/v1")
        .match_body(Matcher::PartialJson(json!({
            "givenContext": { "id": "2", "traits": { "tier": "gold" } }
        })))
        .with_status(200)
        .with_body(config_set("full", &[config_state("plan", "string", "pro")]).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = create_client(SDK_KEY, options(server.url(), false)).unwrap();
    client.initialize(Some(Context::new().with_id("1"))).await;
    assert_eq!(client.get_value("plan", "none").unwrap(), ConfigValue::from("free"));

    client
        .update_context(Context::new().with_id("2").with_trait("tier", "gold"))
        .await;
    assert_eq!(client.get_value("plan", "none").unwrap(), ConfigValue::from("pro"));

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn lifecycle_events_report_action_and_keys() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/pull/v1")
        .with_status(200)
        .with_body(
            config_set(
                "full",
                &[
                    config_state("zeta", "string", "z"),
                    config_state("alpha", "number", "1"),
                ],
            )
            .to_string(),
        )
        .create_async()
        .await;

    let client = create_client(SDK_KEY, options(server.url(), false)).unwrap();
    let actions = Arc::new(Mutex::new(Vec::new()));
    let updates = Arc::new(Mutex::new(Vec::new()));
    let action_sink = Arc::clone(&actions);
    client.on::<ClientReady, _>(move |event| action_sink.lock().unwrap().push(event.action));
    let update_sink = Arc::clone(&updates);
    client.on::<ConfigsUpdated, _>(move |event| update_sink.lock().unwrap().push(event.keys.clone()));

    client.initialize(None).await;
    client.update_context(Context::new().with_name("Bob")).await;

    assert_eq!(
        *actions.lock().unwrap(),
        vec![ConnectAction::Initialization, ConnectAction::ContextUpdate]
    );
    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0], vec!["alpha".to_string(), "zeta".to_string()]);
}

#[tokio::test]
async fn invalid_inputs_are_rejected() {
    let err = create_client(SDK_KEY, ClientOptions::default().with_url("ftp://example.com")).unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));

    let err = create_client(SDK_KEY, ClientOptions::default().with_url("not a url")).unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));

    let client = create_client(SDK_KEY, options("http://127.0.0.1:9".into(), false)).unwrap();
    let err = client.get_value("k", serde_json::Value::Null).unwrap_err();
    assert!(err
        .to_string()
        .contains("The default value for a config must be defined and non-null"));
}

#[tokio::test]
async fn evaluations_are_reported_when_telemetry_is_enabled() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/pull/v1")
        .with_status(200)
        .with_body(config_set("full", &[config_state("k", "string", "v")]).to_string())
        .create_async()
        .await;
    let telemetry = server
        .mock("POST", "/telemetry/v1")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({ "clientSdkKey": SDK_KEY })),
            Matcher::Regex(r#""key":"k""#.to_string()),
            Matcher::Regex(r#""count":2"#.to_string()),
            Matcher::Regex(r#""contextId":"user-9""#.to_string()),
        ]))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let options = ClientOptions {
        telemetry: TelemetryOptions::default(),
        ..options(server.url(), false)
    };
    let client = create_client(SDK_KEY, options).unwrap();
    client.initialize(Some(Context::new().with_id("user-9"))).await;
    client.get_value("k", "default").unwrap();
    client.get_value("k", "default").unwrap();

    let response = client.flush_telemetry().await;

    assert!(response.success);
    telemetry.assert_async().await;
}

#[tokio::test]
async fn nothing_is_reported_when_telemetry_is_disabled() {
    let mut server = Server::new_async().await;
    let telemetry = server
        .mock("POST", "/telemetry/v1")
        .expect(0)
        .create_async()
        .await;

    let client = create_client(SDK_KEY, options(server.url(), false)).unwrap();
    client.get_value("k", "default").unwrap();

    let response = client.flush_telemetry().await;

    assert!(response.success);
    client.close();
    sleep(Duration::from_millis(50)).await;
    telemetry.assert_async().await;
}
