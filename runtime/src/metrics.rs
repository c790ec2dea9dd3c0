//! Metric names and descriptions for the pipeline.
//!
//! Services call [`describe_pipeline_metrics`] once at startup so whichever
//! recorder the binary installs renders meaningful help text. Metric
//! emission itself happens at the bus, worker, and connector layers.

use metrics::describe_counter;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Messages appended to the bus, by stream.
pub const BUS_PUBLISHED: &str = "riskflow.bus.published";
/// Messages routed to a dead-letter stream, by stream and reason.
pub const BUS_DLQ_ROUTED: &str = "riskflow.bus.dlq_routed";
/// Messages a consumer worker handled successfully, by group.
pub const WORKER_HANDLED: &str = "riskflow.worker.handled";
/// Handler failures observed by a consumer worker, by group.
pub const WORKER_FAILED: &str = "riskflow.worker.failed";
/// Connector items fetched per tick, by connector.
pub const CONNECTOR_FETCHED: &str = "riskflow.connector.fetched";
/// Connector items published per tick, by connector.
pub const CONNECTOR_PUBLISHED: &str = "riskflow.connector.published";
/// Connector items skipped as unchanged, by connector.
pub const CONNECTOR_SKIPPED: &str = "riskflow.connector.skipped_unchanged";
/// Connector items failed, by connector.
pub const CONNECTOR_FAILED: &str = "riskflow.connector.failed";
/// Connector ticks surrendered after fetch retries were exhausted.
pub const CONNECTOR_TICK_ERRORS: &str = "riskflow.connector.tick_errors";

/// Register descriptions for every pipeline metric.
pub fn describe_pipeline_metrics() {
    describe_counter!(BUS_PUBLISHED, "Messages appended to the bus");
    describe_counter!(BUS_DLQ_ROUTED, "Messages routed to a dead-letter stream");
    describe_counter!(WORKER_HANDLED, "Messages handled successfully by consumer workers");
    describe_counter!(WORKER_FAILED, "Handler failures in consumer workers");
    describe_counter!(CONNECTOR_FETCHED, "Items fetched by polling connectors");
    describe_counter!(CONNECTOR_PUBLISHED, "Items published by polling connectors");
    describe_counter!(CONNECTOR_SKIPPED, "Items skipped as unchanged by polling connectors");
    describe_counter!(CONNECTOR_FAILED, "Items failed in polling connectors");
    describe_counter!(
        CONNECTOR_TICK_ERRORS,
        "Connector ticks surrendered after fetch retries were exhausted"
    );
}
