//! Classification of canonical signals into structured risks.
//!
//! Classifiers are a capability behind [`Classifier`]; the service composes
//! a primary (typically a model-backed variant) with the deterministic
//! [`RuleBasedClassifier`] as fallback, guarded by a confidence threshold.
//! Primary+fallback is an ordered list with a guard, not inheritance: a
//! primary result below the threshold, or a primary error, falls through to
//! the fallback.

use crate::worker::{HandlerError, HandlerFuture, MessageHandler};
use chrono::Utc;
use riskflow_core::bus::EventRecord;
use riskflow_core::domain::{RiskType, StructuredRisk};
use riskflow_core::signal::ExternalSignal;
use riskflow_core::streams::CLASSIFIED_EVENTS;
use riskflow_core::EventBus;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// A classifier failed to produce a draft.
#[derive(Error, Debug, Clone)]
#[error("classifier failed: {0}")]
pub struct ClassifierError(pub String);

/// Future type returned by [`Classifier::classify`].
pub type ClassifyFuture<'a> =
    Pin<Box<dyn Future<Output = Result<StructuredRiskDraft, ClassifierError>> + Send + 'a>>;

/// A classification result before identity and stamps are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRiskDraft {
    /// Disruption category.
    pub risk_type: RiskType,
    /// Severity in `[0, 1]`.
    pub severity: f64,
    /// Region the risk applies to.
    pub impact_region: String,
    /// Short summary.
    pub summary: String,
    /// Classifier confidence in `[0, 1]`.
    pub classification_confidence: f64,
}

/// A pluggable signal classifier.
pub trait Classifier: Send + Sync {
    /// Version tag stamped onto risks this classifier produces.
    fn model_version(&self) -> &str;

    /// Classify one canonical signal.
    fn classify(&self, signal: &ExternalSignal) -> ClassifyFuture<'_>;
}

/// Keyword rules: `(trigger terms, risk type, severity)`. First match wins.
const KEYWORD_RULES: &[(&[&str], RiskType, f64)] = &[
    (
        &["storm", "cyclone", "hurricane", "flood", "monsoon", "heatwave"],
        RiskType::WeatherDisruption,
        0.70,
    ),
    (
        &["congestion", "backlog", "berth", "anchorage", "vessel queue"],
        RiskType::PortCongestion,
        0.60,
    ),
    (
        &["strike", "walkout", "labor dispute", "labour dispute", "union"],
        RiskType::LaborAction,
        0.65,
    ),
    (
        &["sanction", "embargo", "border closure", "conflict", "unrest"],
        RiskType::Geopolitical,
        0.70,
    ),
    (
        &["derailment", "bridge", "highway closure", "power outage", "accident"],
        RiskType::Infrastructure,
        0.55,
    ),
    (
        &["shortage", "panic buying", "demand surge", "stockpiling"],
        RiskType::DemandShock,
        0.50,
    ),
];

/// Deterministic keyword classifier; the always-available fallback.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    fn draft_for(signal: &ExternalSignal) -> StructuredRiskDraft {
        let content = signal.raw_content.to_lowercase();

        let (risk_type, severity, confidence) = KEYWORD_RULES
            .iter()
            .find(|(terms, _, _)| terms.iter().any(|t| content.contains(t)))
            .map_or((RiskType::Other, 0.30, 0.40), |(_, risk_type, severity)| {
                (*risk_type, *severity, 0.75)
            });

        let mut summary: String = signal.raw_content.chars().take(140).collect();
        if summary.len() < signal.raw_content.len() {
            summary.push('…');
        }

        StructuredRiskDraft {
            risk_type,
            // Provider confidence shades severity a little either way.
            severity: (severity * (0.8 + 0.4 * signal.signal_confidence)).clamp(0.0, 1.0),
            impact_region: signal.geographic_scope.clone(),
            summary,
            classification_confidence: confidence,
        }
    }
}

impl Classifier for RuleBasedClassifier {
    fn model_version(&self) -> &str {
        "rules-v1"
    }

    fn classify(&self, signal: &ExternalSignal) -> ClassifyFuture<'_> {
        let draft = Self::draft_for(signal);
        Box::pin(async move { Ok(draft) })
    }
}

/// Classification service counters.
#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    published: AtomicU64,
    used_fallback: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of [`ClassificationService`] counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassificationCounters {
    /// Signals received.
    pub received: u64,
    /// Risks published.
    pub published: u64,
    /// Classifications that fell back to the rule-based classifier.
    pub used_fallback: u64,
    /// Deliveries that failed.
    pub failed: u64,
}

/// Configuration of the classification service.
#[derive(Debug, Clone)]
pub struct ClassificationConfig {
    /// Primary results below this confidence fall through to the fallback.
    pub confidence_threshold: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
        }
    }
}

/// Reads `external-signals`, publishes `classified-events`.
pub struct ClassificationService {
    primary: Arc<dyn Classifier>,
    fallback: Arc<dyn Classifier>,
    bus: EventBus,
    config: ClassificationConfig,
    counters: Arc<Counters>,
}

impl ClassificationService {
    /// Build the service from a primary classifier and the rule-based
    /// fallback.
    #[must_use]
    pub fn new(
        primary: Arc<dyn Classifier>,
        fallback: Arc<dyn Classifier>,
        bus: EventBus,
        config: ClassificationConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            bus,
            config,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Current counter values.
    #[must_use]
    pub fn counters(&self) -> ClassificationCounters {
        ClassificationCounters {
            received: self.counters.received.load(Ordering::Relaxed),
            published: self.counters.published.load(Ordering::Relaxed),
            used_fallback: self.counters.used_fallback.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Run the primary with the threshold guard, falling back when it is
    /// unconfident or fails outright.
    async fn classify_with_fallback(
        &self,
        signal: &ExternalSignal,
    ) -> Result<(StructuredRiskDraft, String, bool), ClassifierError> {
        match self.primary.classify(signal).await {
            Ok(draft) if draft.classification_confidence >= self.config.confidence_threshold => {
                Ok((draft, self.primary.model_version().to_string(), false))
            }
            Ok(draft) => {
                tracing::debug!(
                    event_id = %signal.event_id,
                    confidence = draft.classification_confidence,
                    threshold = self.config.confidence_threshold,
                    "primary classifier below threshold, using fallback"
                );
                let fallback = self.fallback.classify(signal).await?;
                Ok((fallback, self.fallback.model_version().to_string(), true))
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %signal.event_id,
                    error = %e,
                    "primary classifier failed, using fallback"
                );
                let fallback = self.fallback.classify(signal).await?;
                Ok((fallback, self.fallback.model_version().to_string(), true))
            }
        }
    }
}

impl MessageHandler for ClassificationService {
    type Message = ExternalSignal;

    fn handle<'a>(&'a self, record: &'a EventRecord<Self::Message>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let signal = &record.message;
            self.counters.received.fetch_add(1, Ordering::Relaxed);

            let result = async {
                let (draft, model_version, used_fallback) = self
                    .classify_with_fallback(signal)
                    .await
                    .map_err(HandlerError::from_display)?;

                let risk = StructuredRisk {
                    classification_id: Uuid::new_v4().to_string(),
                    event_id: signal.event_id.clone(),
                    risk_type: draft.risk_type,
                    severity: draft.severity,
                    impact_region: draft.impact_region,
                    summary: draft.summary,
                    classification_confidence: draft.classification_confidence,
                    model_version,
                    processed_at_utc: Utc::now(),
                };

                self.bus
                    .publish(CLASSIFIED_EVENTS, &risk)
                    .await
                    .map_err(HandlerError::from_display)?;

                Ok::<bool, HandlerError>(used_fallback)
            }
            .await;

            match result {
                Ok(used_fallback) => {
                    self.counters.published.fetch_add(1, Ordering::Relaxed);
                    if used_fallback {
                        self.counters.used_fallback.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(())
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use riskflow_core::signal::SourceType;

    fn signal(content: &str) -> ExternalSignal {
        ExternalSignal {
            event_id: "e1".to_string(),
            source_type: SourceType::News,
            raw_content: content.to_string(),
            source_reference: "news://1".to_string(),
            geographic_scope: "IN-MH".to_string(),
            timestamp_utc: "2024-01-01T00:00:00Z".to_string(),
            ingestion_time_utc: "2024-01-01T00:00:01Z".to_string(),
            signal_confidence: 0.5,
        }
    }

    #[test]
    fn keywords_map_to_risk_types() {
        let draft = RuleBasedClassifier::draft_for(&signal("Cyclone warning issued for coast"));
        assert_eq!(draft.risk_type, RiskType::WeatherDisruption);

        let draft = RuleBasedClassifier::draft_for(&signal("dock workers announce strike"));
        assert_eq!(draft.risk_type, RiskType::LaborAction);

        let draft = RuleBasedClassifier::draft_for(&signal("quarterly earnings update"));
        assert_eq!(draft.risk_type, RiskType::Other);
        assert!(draft.classification_confidence < 0.6);
    }

    #[test]
    fn severity_stays_in_range() {
        let mut s = signal("major flood");
        s.signal_confidence = 1.0;
        let draft = RuleBasedClassifier::draft_for(&s);
        assert!((0.0..=1.0).contains(&draft.severity));
    }

    #[test]
    fn summary_is_bounded() {
        let long = "congestion ".repeat(50);
        let draft = RuleBasedClassifier::draft_for(&signal(&long));
        assert!(draft.summary.chars().count() <= 141);
    }
}
