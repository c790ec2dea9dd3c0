//! The risk engine: lane resolution and risk-level bucketing.
//!
//! Lane profiles are configuration, not code: each lane names its
//! origin/destination and a set of trigger terms. Resolution is a substring
//! match over the lowercased impact region — trigger terms first (strong
//! relevance), then origin/destination (weaker). Evaluations whose lane
//! relevance falls below the configured floor are dropped.

use crate::worker::{HandlerError, HandlerFuture, MessageHandler};
use chrono::Utc;
use riskflow_core::bus::EventRecord;
use riskflow_core::domain::{RiskEvaluation, RiskLevel, StructuredRisk};
use riskflow_core::streams::RISK_EVALUATIONS;
use riskflow_core::EventBus;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Relevance assigned when a trigger term matches.
const TRIGGER_TERM_RELEVANCE: f64 = 0.9;
/// Relevance assigned when only an endpoint name matches.
const ENDPOINT_RELEVANCE: f64 = 0.6;
/// Weight of severity in the composite score; relevance carries the rest.
const SEVERITY_WEIGHT: f64 = 0.6;

/// A supply lane and the geographic text that implicates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneProfile {
    /// Stable lane identifier, e.g. `mumbai-delhi-road`.
    pub lane_id: String,
    /// Origin name.
    pub origin: String,
    /// Destination name.
    pub destination: String,
    /// Terms whose presence in an impact region implicates this lane.
    pub trigger_terms: Vec<String>,
}

/// Composite-score thresholds for the risk level buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// At or above: `MEDIUM`.
    pub medium: f64,
    /// At or above: `HIGH`.
    pub high: f64,
    /// At or above: `CRITICAL`.
    pub critical: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 0.40,
            high: 0.65,
            critical: 0.85,
        }
    }
}

impl RiskThresholds {
    /// Bucket a composite score.
    #[must_use]
    pub fn bucket(&self, composite: f64) -> RiskLevel {
        if composite >= self.critical {
            RiskLevel::Critical
        } else if composite >= self.high {
            RiskLevel::High
        } else if composite >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Delay estimate per risk level, hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayTable {
    /// Hours for `LOW`.
    pub low: f64,
    /// Hours for `MEDIUM`.
    pub medium: f64,
    /// Hours for `HIGH`.
    pub high: f64,
    /// Hours for `CRITICAL`.
    pub critical: f64,
}

impl Default for DelayTable {
    fn default() -> Self {
        Self {
            low: 12.0,
            medium: 24.0,
            high: 48.0,
            critical: 96.0,
        }
    }
}

impl DelayTable {
    /// The delay estimate for a level.
    #[must_use]
    pub const fn hours_for(&self, level: RiskLevel) -> f64 {
        match level {
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }
}

/// Externalised risk engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEngineConfig {
    /// The lane profile table.
    pub lanes: Vec<LaneProfile>,
    /// Composite thresholds.
    #[serde(default)]
    pub thresholds: RiskThresholds,
    /// Evaluations below this lane relevance are dropped.
    #[serde(default = "default_min_relevance")]
    pub min_lane_relevance: f64,
    /// Delay estimates per level.
    #[serde(default)]
    pub delay_hours: DelayTable,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            lanes: Vec::new(),
            thresholds: RiskThresholds::default(),
            min_lane_relevance: default_min_relevance(),
            delay_hours: DelayTable::default(),
        }
    }
}

fn default_min_relevance() -> f64 {
    0.2
}

/// Risk engine counters snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskEngineCounters {
    /// Structured risks received.
    pub received: u64,
    /// Evaluations published.
    pub published: u64,
    /// Evaluations dropped below the relevance floor (or with no lane).
    pub dropped: u64,
    /// Deliveries that failed.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Reads `classified-events`, publishes `risk-evaluations`.
pub struct RiskEngine {
    config: RiskEngineConfig,
    bus: EventBus,
    counters: Arc<Counters>,
}

impl RiskEngine {
    /// Build the engine from its configuration.
    #[must_use]
    pub fn new(config: RiskEngineConfig, bus: EventBus) -> Self {
        Self {
            config,
            bus,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Current counter values.
    #[must_use]
    pub fn counters(&self) -> RiskEngineCounters {
        RiskEngineCounters {
            received: self.counters.received.load(Ordering::Relaxed),
            published: self.counters.published.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Resolve the lanes a region implicates, with their relevance.
    ///
    /// Trigger terms are checked first; endpoint names only contribute when
    /// no trigger term of that lane matched.
    #[must_use]
    pub fn resolve_lanes(&self, impact_region: &str) -> Vec<(&LaneProfile, f64)> {
        let region = impact_region.to_lowercase();

        self.config
            .lanes
            .iter()
            .filter_map(|lane| {
                let trigger_hit = lane
                    .trigger_terms
                    .iter()
                    .any(|term| region.contains(&term.to_lowercase()));
                if trigger_hit {
                    return Some((lane, TRIGGER_TERM_RELEVANCE));
                }

                let endpoint_hit = region.contains(&lane.origin.to_lowercase())
                    || region.contains(&lane.destination.to_lowercase());
                endpoint_hit.then_some((lane, ENDPOINT_RELEVANCE))
            })
            .collect()
    }

    /// Compose severity and lane relevance into one score.
    #[must_use]
    pub fn composite_score(severity: f64, relevance: f64) -> f64 {
        (severity.clamp(0.0, 1.0) * SEVERITY_WEIGHT
            + relevance.clamp(0.0, 1.0) * (1.0 - SEVERITY_WEIGHT))
            .clamp(0.0, 1.0)
    }

    /// Evaluate one structured risk against the lane table.
    #[must_use]
    pub fn evaluate(&self, risk: &StructuredRisk) -> Vec<RiskEvaluation> {
        self.resolve_lanes(&risk.impact_region)
            .into_iter()
            .filter(|(_, relevance)| *relevance >= self.config.min_lane_relevance)
            .map(|(lane, relevance)| {
                let composite = Self::composite_score(risk.severity, relevance);
                let level = self.config.thresholds.bucket(composite);
                RiskEvaluation {
                    risk_id: Uuid::new_v4().to_string(),
                    classification_id: risk.classification_id.clone(),
                    event_id: risk.event_id.clone(),
                    lane_id: lane.lane_id.clone(),
                    lane_relevance: relevance,
                    composite_score: composite,
                    risk_level: level,
                    predicted_delay_hours: self.config.delay_hours.hours_for(level),
                    evaluated_at_utc: Utc::now(),
                }
            })
            .collect()
    }
}

impl MessageHandler for RiskEngine {
    type Message = StructuredRisk;

    fn handle<'a>(&'a self, record: &'a EventRecord<Self::Message>) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.counters.received.fetch_add(1, Ordering::Relaxed);
            let evaluations = self.evaluate(&record.message);

            if evaluations.is_empty() {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    classification_id = %record.message.classification_id,
                    impact_region = %record.message.impact_region,
                    "no relevant lane, evaluation dropped"
                );
                return Ok(());
            }

            for evaluation in evaluations {
                match self.bus.publish(RISK_EVALUATIONS, &evaluation).await {
                    Ok(_) => {
                        self.counters.published.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.counters.failed.fetch_add(1, Ordering::Relaxed);
                        return Err(HandlerError::from_display(e));
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use riskflow_core::domain::RiskType;
    use riskflow_testing::InMemoryLogStore;

    fn lanes() -> Vec<LaneProfile> {
        vec![
            LaneProfile {
                lane_id: "mumbai-delhi-road".to_string(),
                origin: "Mumbai".to_string(),
                destination: "Delhi".to_string(),
                trigger_terms: vec!["nhava sheva".to_string(), "jnpt".to_string()],
            },
            LaneProfile {
                lane_id: "chennai-kolkata-rail".to_string(),
                origin: "Chennai".to_string(),
                destination: "Kolkata".to_string(),
                trigger_terms: vec!["east coast".to_string()],
            },
        ]
    }

    fn engine() -> RiskEngine {
        let config = RiskEngineConfig {
            lanes: lanes(),
            ..RiskEngineConfig::default()
        };
        RiskEngine::new(config, EventBus::new(Arc::new(InMemoryLogStore::new())))
    }

    fn risk(region: &str, severity: f64) -> StructuredRisk {
        StructuredRisk {
            classification_id: "c1".to_string(),
            event_id: "e1".to_string(),
            risk_type: RiskType::WeatherDisruption,
            severity,
            impact_region: region.to_string(),
            summary: "storm".to_string(),
            classification_confidence: 0.8,
            model_version: "rules-v1".to_string(),
            processed_at_utc: Utc::now(),
        }
    }

    #[test]
    fn trigger_term_beats_endpoint_match() {
        let engine = engine();
        // "nhava sheva ... mumbai" hits both the trigger term and the origin;
        // the trigger term wins.
        let resolved = engine.resolve_lanes("Nhava Sheva port area, Mumbai");
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0.lane_id, "mumbai-delhi-road");
        assert!((resolved[0].1 - TRIGGER_TERM_RELEVANCE).abs() < f64::EPSILON);
    }

    #[test]
    fn endpoint_match_has_lower_relevance() {
        let engine = engine();
        let resolved = engine.resolve_lanes("flooding reported near Delhi");
        assert_eq!(resolved.len(), 1);
        assert!((resolved[0].1 - ENDPOINT_RELEVANCE).abs() < f64::EPSILON);
    }

    #[test]
    fn unrelated_region_resolves_nothing() {
        let engine = engine();
        assert!(engine.resolve_lanes("Hamburg port").is_empty());
        assert!(engine.evaluate(&risk("Hamburg port", 0.9)).is_empty());
    }

    #[test]
    fn composite_buckets_by_thresholds() {
        let thresholds = RiskThresholds::default();
        assert_eq!(thresholds.bucket(0.39), RiskLevel::Low);
        assert_eq!(thresholds.bucket(0.40), RiskLevel::Medium);
        assert_eq!(thresholds.bucket(0.70), RiskLevel::High);
        assert_eq!(thresholds.bucket(0.90), RiskLevel::Critical);
    }

    #[test]
    fn evaluation_inherits_join_keys_and_delay() {
        let engine = engine();
        let evaluations = engine.evaluate(&risk("JNPT terminal congestion", 0.9));
        assert_eq!(evaluations.len(), 1);

        let eval = &evaluations[0];
        assert_eq!(eval.classification_id, "c1");
        assert_eq!(eval.event_id, "e1");
        // severity 0.9, relevance 0.9 → composite 0.9 → CRITICAL → 96 h.
        assert_eq!(eval.risk_level, RiskLevel::Critical);
        assert!((eval.predicted_delay_hours - 96.0).abs() < f64::EPSILON);
    }
}
