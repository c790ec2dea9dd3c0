//! Mitigation planning.
//!
//! Planners are pluggable through [`MitigationPlanner`]; the service stamps
//! identity onto the returned actions and publishes the plan with a bounded
//! publish retry of its own (the delay is exponential, the budget is
//! `max_publish_attempts`). The handler itself stays out of the worker's
//! retry path unless even the bounded publish fails.

use crate::worker::{HandlerError, HandlerFuture, MessageHandler};
use chrono::Utc;
use riskflow_core::bus::EventRecord;
use riskflow_core::domain::{MitigationAction, MitigationPlan, RiskEvaluation, RiskLevel};
use riskflow_core::streams::MITIGATION_PLANS;
use riskflow_core::EventBus;
use riskflow_runtime::retry::{retry_with_backoff, RetryPolicy};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// A planner failed to produce actions.
#[derive(Error, Debug, Clone)]
#[error("mitigation planner failed: {0}")]
pub struct PlannerError(pub String);

/// Future type returned by [`MitigationPlanner::plan_actions`].
pub type PlanFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<MitigationAction>, PlannerError>> + Send + 'a>>;

/// A pluggable mitigation planner.
pub trait MitigationPlanner: Send + Sync {
    /// Produce the actions for one evaluated risk. Must return at least one
    /// action; an empty result is treated as a planner failure.
    fn plan_actions(&self, evaluation: &RiskEvaluation) -> PlanFuture<'_>;
}

/// Deterministic level-based planner; the always-available default.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedPlanner;

impl RuleBasedPlanner {
    fn actions_for(level: RiskLevel, lane_id: &str) -> Vec<MitigationAction> {
        match level {
            RiskLevel::Critical => vec![
                MitigationAction {
                    action_type: "REROUTE".to_string(),
                    description: format!("Reroute in-flight shipments off lane {lane_id}"),
                    priority: 1,
                },
                MitigationAction {
                    action_type: "EXPEDITE".to_string(),
                    description: "Book premium freight for replacement stock".to_string(),
                    priority: 1,
                },
                MitigationAction {
                    action_type: "NOTIFY_CUSTOMERS".to_string(),
                    description: "Warn affected customers of expected delays".to_string(),
                    priority: 2,
                },
            ],
            RiskLevel::High => vec![
                MitigationAction {
                    action_type: "EXPEDITE".to_string(),
                    description: format!("Expedite next departures on lane {lane_id}"),
                    priority: 1,
                },
                MitigationAction {
                    action_type: "BUFFER_STOCK".to_string(),
                    description: "Release safety stock at destination".to_string(),
                    priority: 2,
                },
            ],
            RiskLevel::Medium => vec![
                MitigationAction {
                    action_type: "PREBOOK_CAPACITY".to_string(),
                    description: format!("Pre-book alternate capacity for lane {lane_id}"),
                    priority: 2,
                },
                MitigationAction {
                    action_type: "MONITOR".to_string(),
                    description: "Increase monitoring cadence on the lane".to_string(),
                    priority: 3,
                },
            ],
            RiskLevel::Low => vec![MitigationAction {
                action_type: "MONITOR".to_string(),
                description: format!("Monitor lane {lane_id}"),
                priority: 3,
            }],
        }
    }
}

impl MitigationPlanner for RuleBasedPlanner {
    fn plan_actions(&self, evaluation: &RiskEvaluation) -> PlanFuture<'_> {
        let actions = Self::actions_for(evaluation.risk_level, &evaluation.lane_id);
        Box::pin(async move { Ok(actions) })
    }
}

/// Configuration of the mitigation service.
#[derive(Debug, Clone)]
pub struct MitigationConfig {
    /// Publish attempts before the delivery is handed back to the worker.
    pub max_publish_attempts: usize,
    /// Delay before the first publish retry; doubles per attempt.
    pub publish_backoff: Duration,
}

impl Default for MitigationConfig {
    fn default() -> Self {
        Self {
            max_publish_attempts: 3,
            publish_backoff: Duration::from_millis(200),
        }
    }
}

/// Mitigation service counters snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MitigationCounters {
    /// Evaluations received.
    pub received: u64,
    /// Plans published.
    pub published: u64,
    /// Deliveries that failed.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
}

/// Reads `risk-evaluations`, publishes `mitigation-plans`.
pub struct MitigationService {
    planner: Arc<dyn MitigationPlanner>,
    bus: EventBus,
    config: MitigationConfig,
    counters: Arc<Counters>,
}

impl MitigationService {
    /// Build the service around a planner.
    #[must_use]
    pub fn new(planner: Arc<dyn MitigationPlanner>, bus: EventBus, config: MitigationConfig) -> Self {
        Self {
            planner,
            bus,
            config,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Current counter values.
    #[must_use]
    pub fn counters(&self) -> MitigationCounters {
        MitigationCounters {
            received: self.counters.received.load(Ordering::Relaxed),
            published: self.counters.published.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl MessageHandler for MitigationService {
    type Message = RiskEvaluation;

    fn handle<'a>(&'a self, record: &'a EventRecord<Self::Message>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let evaluation = &record.message;
            self.counters.received.fetch_add(1, Ordering::Relaxed);

            let result = async {
                let actions = self
                    .planner
                    .plan_actions(evaluation)
                    .await
                    .map_err(HandlerError::from_display)?;

                if actions.is_empty() {
                    return Err(HandlerError(format!(
                        "planner returned no actions for risk {}",
                        evaluation.risk_id
                    )));
                }

                let plan = MitigationPlan {
                    plan_id: Uuid::new_v4().to_string(),
                    risk_id: evaluation.risk_id.clone(),
                    event_id: evaluation.event_id.clone(),
                    lane_id: evaluation.lane_id.clone(),
                    risk_level: evaluation.risk_level,
                    predicted_delay_hours: evaluation.predicted_delay_hours,
                    actions,
                    created_at_utc: Utc::now(),
                };

                let policy = RetryPolicy::builder()
                    .max_retries(self.config.max_publish_attempts.saturating_sub(1))
                    .initial_delay(self.config.publish_backoff)
                    .build();

                retry_with_backoff(policy, || async {
                    self.bus.publish(MITIGATION_PLANS, &plan).await
                })
                .await
                .map_err(HandlerError::from_display)?;

                Ok::<(), HandlerError>(())
            }
            .await;

            match result {
                Ok(()) => {
                    self.counters.published.fetch_add(1, Ordering::Relaxed);
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
