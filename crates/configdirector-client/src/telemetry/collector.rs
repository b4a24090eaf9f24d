use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

use super::aggregator::EventAggregator;
use super::events::{EvaluatedConfigEvent, EvaluationRecord};
use super::queue::EventQueue;
use super::reporter::{
    AggregatedEventList, DroppedEvents, ReporterResponse, TelemetryBatch, TelemetrySink,
};
use crate::config::TelemetryOptions;
use crate::lock;

/// Host visibility, used to flush before the application is backgrounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

struct CollectorInner {
    queue: Mutex<EventQueue<EvaluatedConfigEvent>>,
    aggregator: EventAggregator,
    sink: Arc<dyn TelemetrySink>,
    collecting: AtomicBool,
}

impl CollectorInner {
    fn take_batch(&self) -> TelemetryBatch {
        let snapshot = lock(&self.queue).take_snapshot();
        TelemetryBatch {
            aggregated_events: AggregatedEventList {
                evaluated_config: self.aggregator.aggregate(&snapshot),
            },
            dropped_events: DroppedEvents {
                evaluated_config: snapshot.dropped_count,
            },
            ..TelemetryBatch::default()
        }
    }

    async fn flush(&self) -> ReporterResponse {
        let batch = self.take_batch();
        self.sink.report(batch).await
    }

    fn stop_collecting(&self) {
        self.collecting.store(false, Ordering::Release);
        lock(&self.queue).clear();
    }
}

/// Records config evaluations and periodically ships them in aggregated form.
///
/// The flush loop runs on its own task and only touches the collector's queue.
pub struct TelemetryEventCollector {
    inner: Arc<CollectorInner>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for TelemetryEventCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryEventCollector")
            .field("collecting", &self.is_collecting())
            .field("queued", &lock(&self.inner.queue).len())
            .finish()
    }
}

impl TelemetryEventCollector {
    /// Creates the collector and schedules its flush loop on the current tokio
    /// runtime. Without a runtime, events are only shipped by explicit flushes.
    pub fn new(
        sink: Arc<dyn TelemetrySink>,
        options: &TelemetryOptions,
        visibility: Option<watch::Receiver<Visibility>>,
    ) -> Self {
        let inner = Arc::new(CollectorInner {
            queue: Mutex::new(EventQueue::new(options.queue_capacity)),
            aggregator: EventAggregator::new(),
            sink,
            collecting: AtomicBool::new(true),
        });
        let cancel = CancellationToken::new();

        let task = match Handle::try_current() {
            Ok(handle) => Some(handle.spawn(run_flush_loop(
                Arc::clone(&inner),
                cancel.clone(),
                options.initial_flush_delay,
                options.flush_interval,
                visibility,
            )
            .in_current_span())),
            Err(_) => {
                warn!("[TelemetryEventCollector] No tokio runtime available, periodic flushing is disabled");
                None
            }
        };

        Self {
            inner,
            cancel,
            task: Mutex::new(task),
            closed: AtomicBool::new(false),
        }
    }

    /// Queues one evaluation. No-op once collection has stopped.
    pub fn evaluated_config(&self, record: EvaluationRecord) {
        if !self.is_collecting() {
            return;
        }
        let event = EvaluatedConfigEvent::from(record);
        lock(&self.inner.queue).push([event]);
    }

    pub fn is_collecting(&self) -> bool {
        self.inner.collecting.load(Ordering::Acquire)
    }

    pub fn queued_len(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// Drains the queue and reports it immediately.
    pub async fn flush(&self) -> ReporterResponse {
        let response = self.inner.flush().await;
        if response.fatal_error {
            self.inner.stop_collecting();
        }
        response
    }

    /// Stops the flush loop and hands the remaining events to one final,
    /// detached report. Subsequent calls do nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.collecting.store(false, Ordering::Release);
        self.cancel.cancel();
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }

        let batch = self.inner.take_batch();
        lock(&self.inner.queue).clear();
        if batch.is_empty() {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                let sink = Arc::clone(&self.inner.sink);
                handle.spawn(async move {
                    sink.report(batch).await;
                });
            }
            Err(_) => {
                debug!("[TelemetryEventCollector] No tokio runtime available, discarding final telemetry batch");
            }
        }
    }

    pub fn dispose(&self) {
        self.close();
    }
}

impl Drop for TelemetryEventCollector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_flush_loop(
    inner: Arc<CollectorInner>,
    cancel: CancellationToken,
    initial_delay: Duration,
    interval: Duration,
    mut visibility: Option<watch::Receiver<Visibility>>,
) {
    let timer = tokio::time::sleep(initial_delay);
    tokio::pin!(timer);

    loop {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = &mut timer => {
                timer.as_mut().reset(Instant::now() + interval);
                inner.flush().await
            }
            hidden = wait_for_hidden(visibility.as_mut()) => {
                if !hidden {
                    visibility = None;
                    continue;
                }
                debug!("[TelemetryEventCollector] Host became hidden, flushing telemetry");
                inner.flush().await
            }
        };

        if response.fatal_error {
            inner.stop_collecting();
            warn!("[TelemetryEventCollector] Received a fatal error from telemetry collection. No longer collecting events.");
            return;
        }
    }
}

/// Resolves with `true` once the source reports `Hidden`, or `false` when the
/// source is gone. Never resolves without a source.
async fn wait_for_hidden(visibility: Option<&mut watch::Receiver<Visibility>>) -> bool {
    let Some(receiver) = visibility else {
        return std::future::pending().await;
    };
    loop {
        if receiver.changed().await.is_err() {
            return false;
        }
        if *receiver.borrow_and_update() == Visibility::Hidden {
            return true;
        }
    }
}
