//! Usage telemetry: every config evaluation is queued, aggregated per window
//! and shipped in batches to the telemetry endpoint.

pub mod aggregator;
pub mod collector;
pub mod events;
pub mod queue;
pub mod reporter;

pub use aggregator::{AggregatedEvent, EventAggregator};
pub use collector::{TelemetryEventCollector, Visibility};
pub use events::{djb2_hash, EvaluatedConfigEvent, EvaluationRecord};
pub use queue::{EventQueue, QueueSnapshot};
pub use reporter::{EventReporter, ReporterResponse, TelemetryBatch, TelemetrySink};
