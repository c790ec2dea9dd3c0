//! Pipeline binary: every consumer-group worker in one process.
//!
//! Builds the components in dependency order — store, bus, idempotency,
//! planning state — then runs one task per worker. Horizontal scaling is a
//! matter of running more copies of this process: the consumer groups share
//! delivery.

use anyhow::Context;
use riskflow_core::{EventBus, IdempotencyStore};
use riskflow_ingestion::SignalIngestor;
use riskflow_pipeline::classify::{ClassificationConfig, ClassificationService, RuleBasedClassifier};
use riskflow_pipeline::impact::PlanningImpactService;
use riskflow_pipeline::mitigation::{MitigationConfig, MitigationService, RuleBasedPlanner};
use riskflow_pipeline::planning::{
    InventorySnapshotHandler, PlanningStateStore, ShipmentPlanHandler,
};
use riskflow_pipeline::raw_worker::RawSignalHandler;
use riskflow_pipeline::risk::{LaneProfile, RiskEngine, RiskEngineConfig};
use riskflow_pipeline::worker::{MessageHandler, StreamWorker, WorkerConfig};
use riskflow_runtime::shutdown;
use riskflow_services::{connect_bus, consumer_name, init_tracing, CoreSettings};
use std::sync::Arc;
use std::time::Duration;

/// Lane table used when `RISKFLOW_LANE_PROFILES` is not set.
fn default_lanes() -> Vec<LaneProfile> {
    vec![
        LaneProfile {
            lane_id: "mumbai-delhi-road".to_string(),
            origin: "Mumbai".to_string(),
            destination: "Delhi".to_string(),
            trigger_terms: vec!["nhava sheva".to_string(), "jnpt".to_string()],
        },
        LaneProfile {
            lane_id: "chennai-bengaluru-road".to_string(),
            origin: "Chennai".to_string(),
            destination: "Bengaluru".to_string(),
            trigger_terms: vec!["ennore".to_string(), "kathipara".to_string()],
        },
        LaneProfile {
            lane_id: "kolkata-guwahati-rail".to_string(),
            origin: "Kolkata".to_string(),
            destination: "Guwahati".to_string(),
            trigger_terms: vec!["siliguri".to_string(), "chicken's neck".to_string()],
        },
    ]
}

/// Lane profiles from `RISKFLOW_LANE_PROFILES` (inline JSON array), else the
/// defaults. Malformed JSON is startup-fatal.
fn lane_profiles() -> anyhow::Result<Vec<LaneProfile>> {
    match std::env::var("RISKFLOW_LANE_PROFILES") {
        Err(_) => Ok(default_lanes()),
        Ok(raw) => serde_json::from_str(&raw).context("RISKFLOW_LANE_PROFILES is not valid JSON"),
    }
}

fn worker_config(settings: &CoreSettings, stream: &str, group: &str) -> WorkerConfig {
    WorkerConfig::new(stream, group, consumer_name())
        .with_retry_key_ttl_seconds(settings.retry_key_ttl_seconds)
}

fn spawn<H>(
    settings: &CoreSettings,
    stream: &str,
    group: &str,
    bus: &EventBus,
    handler: H,
    controller: &shutdown::ShutdownController,
) -> tokio::task::JoinHandle<()>
where
    H: MessageHandler + Send + Sync + 'static,
{
    let worker = StreamWorker::new(worker_config(settings, stream, group), bus.clone(), handler);
    let signal = controller.signal();
    let (stream, group) = (stream.to_string(), group.to_string());
    tokio::spawn(async move {
        if let Err(e) = worker.run(signal).await {
            tracing::error!(stream = %stream, group = %group, error = %e, "worker exited");
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    riskflow_runtime::metrics::describe_pipeline_metrics();

    let settings = CoreSettings::from_env().context("failed to load core settings")?;
    let lanes = lane_profiles()?;

    let bus = connect_bus(&settings)
        .await
        .context("failed to connect to the log store")?;
    let store = bus.store();
    let markers = IdempotencyStore::new(Arc::clone(&store))
        .with_ttl_seconds(settings.dedup_ttl_seconds);
    let planning = PlanningStateStore::new(store);
    let ingestor = SignalIngestor::new(bus.clone(), markers);

    let (controller, _signal) = shutdown::channel();

    use riskflow_core::streams::{
        CLASSIFIED_EVENTS, EXTERNAL_SIGNALS, INVENTORY_SNAPSHOTS, MITIGATION_PLANS,
        RAW_INPUT_SIGNALS, RISK_EVALUATIONS, SHIPMENT_PLANS,
    };

    let workers = vec![
        spawn(
            &settings,
            RAW_INPUT_SIGNALS,
            "signal-normalizer",
            &bus,
            RawSignalHandler::new(ingestor),
            &controller,
        ),
        spawn(
            &settings,
            SHIPMENT_PLANS,
            "planning-state",
            &bus,
            ShipmentPlanHandler::new(planning.clone()),
            &controller,
        ),
        spawn(
            &settings,
            INVENTORY_SNAPSHOTS,
            "planning-state",
            &bus,
            InventorySnapshotHandler::new(planning.clone()),
            &controller,
        ),
        spawn(
            &settings,
            EXTERNAL_SIGNALS,
            "classification",
            &bus,
            ClassificationService::new(
                Arc::new(RuleBasedClassifier),
                Arc::new(RuleBasedClassifier),
                bus.clone(),
                ClassificationConfig::default(),
            ),
            &controller,
        ),
        spawn(
            &settings,
            CLASSIFIED_EVENTS,
            "risk-engine",
            &bus,
            RiskEngine::new(
                RiskEngineConfig {
                    lanes,
                    ..RiskEngineConfig::default()
                },
                bus.clone(),
            ),
            &controller,
        ),
        spawn(
            &settings,
            RISK_EVALUATIONS,
            "mitigation-planning",
            &bus,
            MitigationService::new(
                Arc::new(RuleBasedPlanner),
                bus.clone(),
                MitigationConfig::default(),
            ),
            &controller,
        ),
        spawn(
            &settings,
            MITIGATION_PLANS,
            "planning-impact",
            &bus,
            PlanningImpactService::new(planning, bus.clone()),
            &controller,
        ),
    ];

    tracing::info!(workers = workers.len(), "pipeline running");

    shutdown::interrupted().await;
    tracing::info!("shutdown signal received, draining workers");
    controller.shutdown();

    // Bounded grace period for in-flight handlers.
    let drain = async {
        for worker in workers {
            let _ = worker.await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(10), drain).await.is_err() {
        tracing::warn!("drain period elapsed before all workers stopped");
    }

    tracing::info!("pipeline stopped");
    Ok(())
}
