//! Domain records threaded through the pipeline.
//!
//! Each record carries the identifiers of its upstream ancestors
//! (`event_id`, `classification_id`, `risk_id`) so cross-stream joins remain
//! possible offline. Numeric outputs are rounded at fixed decimal places:
//! probabilities to 4 dp, currency to 2 dp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk level buckets produced by the risk engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Below the medium threshold.
    Low,
    /// At or above the medium threshold.
    Medium,
    /// At or above the high threshold.
    High,
    /// At or above the critical threshold.
    Critical,
}

impl RiskLevel {
    /// Stable wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// The category of disruption a classified risk describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskType {
    /// Storms, floods, extreme temperature.
    WeatherDisruption,
    /// Port or terminal congestion.
    PortCongestion,
    /// Strikes and labour disputes.
    LaborAction,
    /// Sanctions, border closures, conflict.
    Geopolitical,
    /// Road, rail, bridge or utility failure.
    Infrastructure,
    /// Sudden demand spikes or collapses.
    DemandShock,
    /// Anything else.
    Other,
}

/// A structured risk produced by the classification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRisk {
    /// Fresh identifier minted per classification.
    pub classification_id: String,
    /// The originating signal's event id.
    pub event_id: String,
    /// Disruption category.
    pub risk_type: RiskType,
    /// Severity in `[0, 1]`.
    pub severity: f64,
    /// Free-text region the risk applies to.
    pub impact_region: String,
    /// Short human-readable summary.
    pub summary: String,
    /// Classifier confidence in `[0, 1]`.
    pub classification_confidence: f64,
    /// Version tag of the model or rule set that produced this.
    pub model_version: String,
    /// When classification completed.
    pub processed_at_utc: DateTime<Utc>,
}

/// A lane-level risk evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvaluation {
    /// Fresh identifier minted per evaluation.
    pub risk_id: String,
    /// The classification this evaluation derives from.
    pub classification_id: String,
    /// The originating signal's event id.
    pub event_id: String,
    /// The impacted supply lane.
    pub lane_id: String,
    /// How relevant the risk is to this lane, in `[0, 1]`.
    pub lane_relevance: f64,
    /// Composite of severity and relevance, in `[0, 1]`.
    pub composite_score: f64,
    /// Bucketed risk level.
    pub risk_level: RiskLevel,
    /// Estimated lane delay in hours.
    pub predicted_delay_hours: f64,
    /// When evaluation completed.
    pub evaluated_at_utc: DateTime<Utc>,
}

/// One concrete step in a mitigation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MitigationAction {
    /// Machine-readable action kind, e.g. `REROUTE`, `EXPEDITE`.
    pub action_type: String,
    /// Human-readable instruction.
    pub description: String,
    /// 1 is most urgent.
    pub priority: u8,
}

/// A mitigation plan for one evaluated risk. Always carries at least one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationPlan {
    /// Fresh identifier minted per plan.
    pub plan_id: String,
    /// The evaluation this plan answers.
    pub risk_id: String,
    /// The originating signal's event id.
    pub event_id: String,
    /// The impacted supply lane.
    pub lane_id: String,
    /// Risk level the plan was sized for.
    pub risk_level: RiskLevel,
    /// Delay estimate the plan was sized for, in hours.
    pub predicted_delay_hours: f64,
    /// Ordered mitigation steps, most urgent first.
    pub actions: Vec<MitigationAction>,
    /// When planning completed.
    pub created_at_utc: DateTime<Utc>,
}

/// A planned shipment, upserted via the planning gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentPlan {
    /// Shipment identifier.
    pub shipment_id: String,
    /// Lane the shipment travels.
    pub lane_id: String,
    /// Stock-keeping unit carried.
    pub sku: String,
    /// Units on the shipment.
    pub quantity: u64,
    /// Revenue per unit, INR.
    pub unit_revenue_inr: f64,
    /// Estimated arrival.
    pub eta_utc: DateTime<Utc>,
}

/// An inventory snapshot, upserted via the planning gateway. Quantities are
/// units; `safety_stock` converts to days as `safety_stock / daily_demand`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    /// Stock-keeping unit.
    pub sku: String,
    /// Units on hand.
    pub on_hand: f64,
    /// Units in transit.
    pub in_transit: f64,
    /// Units consumed per day.
    pub daily_demand: f64,
    /// Safety stock, units.
    pub safety_stock: f64,
}

/// A shipment projected to be at risk from a mitigation plan's delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtRiskShipment {
    /// The affected shipment.
    pub shipment_id: String,
    /// The plan that triggered the projection.
    pub plan_id: String,
    /// The evaluation behind the plan.
    pub risk_id: String,
    /// The originating signal's event id.
    pub event_id: String,
    /// Lane of the shipment.
    pub lane_id: String,
    /// Stock-keeping unit carried.
    pub sku: String,
    /// Projected delay, days.
    pub delay_days: f64,
    /// Probability of stockout, rounded to 4 dp.
    pub stockout_probability: f64,
    /// Revenue at risk, INR, rounded to 2 dp.
    pub revenue_at_risk_inr: f64,
    /// Projected stockout date, when the probability is positive.
    pub projected_stockout_utc: Option<DateTime<Utc>>,
    /// When the projection was computed.
    pub assessed_at_utc: DateTime<Utc>,
}

/// Inventory exposure paired with an [`AtRiskShipment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryExposure {
    /// Stock-keeping unit.
    pub sku: String,
    /// The affected shipment.
    pub shipment_id: String,
    /// The plan that triggered the projection.
    pub plan_id: String,
    /// The originating signal's event id.
    pub event_id: String,
    /// Lane of the shipment.
    pub lane_id: String,
    /// Days of demand covered by on-hand plus in-transit stock.
    pub days_of_cover: f64,
    /// Probability of stockout, rounded to 4 dp.
    pub stockout_probability: f64,
    /// Revenue at risk, INR, rounded to 2 dp.
    pub revenue_at_risk_inr: f64,
    /// Projected stockout date, when the probability is positive.
    pub projected_stockout_utc: Option<DateTime<Utc>>,
    /// When the projection was computed.
    pub assessed_at_utc: DateTime<Utc>,
}

/// Round a probability to 4 decimal places.
#[must_use]
pub fn round_probability(p: f64) -> f64 {
    (p * 10_000.0).round() / 10_000.0
}

/// Round a currency amount to 2 decimal places.
#[must_use]
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn rounding_is_fixed_decimal() {
        assert!((round_probability(0.123_456) - 0.1235).abs() < f64::EPSILON);
        assert!((round_currency(499.999) - 500.0).abs() < f64::EPSILON);
        assert!((round_currency(0.005) - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn risk_level_ordering_matches_severity() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn risk_level_serializes_screaming() {
        let json = serde_json::to_string(&RiskLevel::Critical).unwrap();
        assert_eq!(json, r#""CRITICAL""#);
    }
}
