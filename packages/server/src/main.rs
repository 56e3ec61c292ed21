use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use server::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let runtime = server::init(config).await?;

    for queue in [&runtime.synthesis, &runtime.derivation] {
        let counts = queue.counts().await?;
        tracing::info!(
            "Queue {}: {} waiting, {} delayed, {} orphaned",
            queue.name(),
            counts.waiting,
            counts.delayed,
            counts.orphaned
        );
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    runtime.shutdown().await;

    Ok(())
}
