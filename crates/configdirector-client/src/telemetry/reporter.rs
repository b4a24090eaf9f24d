//! Ships aggregated telemetry to the service.
//!
//! The reporter carries a one-way circuit breaker: a 4xx answer or a request
//! that cannot even be dispatched halts it for the lifetime of the instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::{debug, warn};

use super::aggregator::AggregatedEvent;
use super::events::EvaluatedConfigEvent;
use crate::error::is_status_fatal;

/// Aggregated groups per event kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedEventList {
    pub evaluated_config: Vec<AggregatedEvent<EvaluatedConfigEvent>>,
}

/// Events evicted from the queue per event kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedEvents {
    pub evaluated_config: u64,
}

/// Events sent individually; no kind is reported this way yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DiscreteEventList {}

/// Contents of one flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryBatch {
    pub discrete_events: DiscreteEventList,
    pub aggregated_events: AggregatedEventList,
    pub dropped_events: DroppedEvents,
}

impl TelemetryBatch {
    pub fn is_empty(&self) -> bool {
        self.aggregated_events.evaluated_config.is_empty()
            && self.dropped_events.evaluated_config == 0
    }
}

/// Wire body posted to the telemetry endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventReport<'a> {
    pub client_sdk_key: &'a str,
    pub discrete_events: &'a DiscreteEventList,
    pub aggregated_events: &'a AggregatedEventList,
    pub dropped_events: &'a DroppedEvents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReporterResponse {
    pub success: bool,
    /// Set when the reporter tripped its breaker; no further reports will be sent.
    pub fatal_error: bool,
}

impl ReporterResponse {
    pub const SUCCESS: Self = Self {
        success: true,
        fatal_error: false,
    };
    pub const TRANSIENT: Self = Self {
        success: false,
        fatal_error: false,
    };
    pub const FATAL: Self = Self {
        success: false,
        fatal_error: true,
    };
}

/// Destination of telemetry batches.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn report(&self, batch: TelemetryBatch) -> ReporterResponse;
}

/// HTTP [`TelemetrySink`] posting to `{base}/telemetry/v1`.
#[derive(Debug)]
pub struct EventReporter {
    client: Client,
    url: Url,
    sdk_key: String,
    request_timeout: Duration,
    halted: AtomicBool,
}

impl EventReporter {
    pub fn new(client: Client, url: Url, sdk_key: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client,
            url,
            sdk_key: sdk_key.into(),
            request_timeout,
            halted: AtomicBool::new(false),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    async fn send(&self, batch: &TelemetryBatch) -> ReporterResponse {
        let report = EventReport {
            client_sdk_key: &self.sdk_key,
            discrete_events: &batch.discrete_events,
            aggregated_events: &batch.aggregated_events,
            dropped_events: &batch.dropped_events,
        };
        let result = self
            .client
            .post(self.url.clone())
            .timeout(self.request_timeout)
            .json(&report)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => ReporterResponse::SUCCESS,
            Ok(response) => {
                let status = response.status().as_u16();
                if is_status_fatal(status) {
                    warn!(
                        status,
                        "[EventReporter] Telemetry endpoint rejected the report. No more telemetry data will be sent."
                    );
                    ReporterResponse::FATAL
                } else {
                    debug!(status, "[EventReporter] Telemetry report failed, will retry next window");
                    ReporterResponse::TRANSIENT
                }
            }
            Err(e) if e.is_builder() => {
                warn!(
                    error = %e,
                    "[EventReporter] Fatal error attempting to send telemetry data. No more telemetry data will be sent."
                );
                ReporterResponse::FATAL
            }
            Err(e) => {
                debug!(error = %e, "[EventReporter] Telemetry report failed, will retry next window");
                ReporterResponse::TRANSIENT
            }
        }
    }
}

#[async_trait]
impl TelemetrySink for EventReporter {
    async fn report(&self, batch: TelemetryBatch) -> ReporterResponse {
        if self.is_halted() {
            return ReporterResponse::FATAL;
        }
        if batch.is_empty() {
            return ReporterResponse::SUCCESS;
        }

        let response = self.send(&batch).await;
        if response.fatal_error {
            self.halted.store(true, Ordering::Release);
        }
        response
    }
}
