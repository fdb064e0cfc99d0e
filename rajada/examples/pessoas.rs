use rajada::{aggregate::RunSummary, config::SimulationConfig, pessoas};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // First argument: optional JSON config. Without it the reference workload runs
    // against http://localhost:8080 (or RAJADA_BASE_URL).
    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    }
    .apply_env();

    let simulation = pessoas::simulation(&config)?;

    let (stop, shutdown) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, stopping dispatch");
            let _ = stop.send(true);
        }
    });

    let report = simulation.run_until::<RunSummary>(shutdown).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
