//! Planning gateway binary: the HTTP front door onto `shipment-plans` and
//! `inventory-snapshots`.

use anyhow::Context;
use riskflow_runtime::shutdown;
use riskflow_services::{connect_bus, init_tracing, CoreSettings};
use riskflow_web::planning_gateway::PlanningGateway;
use riskflow_web::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = CoreSettings::from_env().context("failed to load core settings")?;
    let config = GatewayConfig::from_env("PLANNING_GATEWAY", 8091)
        .context("failed to load gateway config")?;

    let bus = connect_bus(&settings)
        .await
        .context("failed to connect to the log store")?;

    let (controller, signal) = shutdown::channel();
    tokio::spawn(async move {
        shutdown::interrupted().await;
        tracing::info!("shutdown signal received");
        controller.shutdown();
    });

    PlanningGateway::new(bus, config)
        .serve(signal)
        .await
        .context("planning gateway failed")?;

    tracing::info!("planning gateway stopped");
    Ok(())
}
