//! Payload builders and option presets shared by the client scenarios.
#![allow(dead_code)]

use std::time::Duration;

use configdirector_client::{ClientOptions, TelemetryOptions};
use serde_json::{json, Value};

pub const SDK_KEY: &str = "test-sdk-key";

/// One config state as the service sends it.
pub fn config_state(key: &str, config_type: &str, value: &str) -> Value {
    json!({
        "id": format!("{key}-id"),
        "key": key,
        "type": config_type,
        "value": value,
    })
}

/// A config set document of `kind` holding `states`.
pub fn config_set(kind: &str, states: &[Value]) -> Value {
    let configs: serde_json::Map<String, Value> = states
        .iter()
        .map(|state| (state["key"].as_str().unwrap_or_default().to_string(), state.clone()))
        .collect();
    json!({
        "environmentId": "env-1",
        "projectId": "project-1",
        "kind": kind,
        "configs": configs,
    })
}

/// Frames each document as one SSE `data` event.
pub fn sse_body(sets: &[Value]) -> String {
    sets.iter().map(|set| format!("data: {set}\n\n")).collect()
}

/// Options pointing at `url` with telemetry off and a short connect timeout.
pub fn options(url: String, streaming: bool) -> ClientOptions {
    ClientOptions {
        telemetry: TelemetryOptions {
            enabled: false,
            ..TelemetryOptions::default()
        },
        ..ClientOptions::default()
    }
    .with_url(url)
    .with_streaming(streaming)
    .with_timeout(Duration::from_millis(1_500))
}
