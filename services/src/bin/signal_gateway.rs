//! Signal gateway binary: the HTTP front door onto `raw-input-signals`.

use anyhow::Context;
use riskflow_runtime::shutdown;
use riskflow_services::{connect_bus, init_tracing, CoreSettings};
use riskflow_web::signal_gateway::SignalGateway;
use riskflow_web::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = CoreSettings::from_env().context("failed to load core settings")?;
    let config = GatewayConfig::from_env("SIGNAL_GATEWAY", 8090)
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

    SignalGateway::new(bus, config)
        .serve(signal)
        .await
        .context("signal gateway failed")?;

    tracing::info!("signal gateway stopped");
    Ok(())
}
