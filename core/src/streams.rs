//! Wire-stable stream names.
//!
//! Producers and consumers agree on these literal strings; renaming any of
//! them is a breaking wire change.

/// Raw signals as received from connectors and the signal gateway.
pub const RAW_INPUT_SIGNALS: &str = "raw-input-signals";

/// Normalised, validated, deduplicated canonical signals.
pub const EXTERNAL_SIGNALS: &str = "external-signals";

/// Structured risks produced by the classification service.
pub const CLASSIFIED_EVENTS: &str = "classified-events";

/// Lane-level risk evaluations produced by the risk engine.
pub const RISK_EVALUATIONS: &str = "risk-evaluations";

/// Mitigation plans produced by the mitigation planning service.
pub const MITIGATION_PLANS: &str = "mitigation-plans";

/// Shipments projected to be at risk by the planning impact service.
pub const AT_RISK_SHIPMENTS: &str = "at-risk-shipments";

/// Inventory exposure projections paired with at-risk shipments.
pub const INVENTORY_EXPOSURES: &str = "inventory-exposures";

/// Planned shipments published by the planning gateway.
pub const SHIPMENT_PLANS: &str = "shipment-plans";

/// Inventory snapshots published by the planning gateway.
pub const INVENTORY_SNAPSHOTS: &str = "inventory-snapshots";

/// Dead-letter stream for a source stream.
///
/// Each consuming group routes exhausted or undecodable messages here.
#[must_use]
pub fn dlq_stream(source_stream: &str) -> String {
    format!("{source_stream}.dlq")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlq_stream_appends_suffix() {
        assert_eq!(dlq_stream(EXTERNAL_SIGNALS), "external-signals.dlq");
    }
}
