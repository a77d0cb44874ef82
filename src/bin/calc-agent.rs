use std::sync::Arc;

use anyhow::Context;
use calc_grid::agent::{self, Agent};
use calc_grid::config::AgentConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AgentConfig::try_from_env().context("invalid agent configuration")?;

    eprintln!("🔧 calc-grid agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Coordinator: {}", config.coordinator_url);
    eprintln!("   Compute: {} (serving on {})", config.compute_url, config.compute_bind);
    eprintln!("   Polling loops: {}", config.concurrency);
    eprintln!("   Backoff: {}s\n", config.backoff.as_secs());

    // Host the compute endpoint this agent (and its peers) call
    let listener = tokio::net::TcpListener::bind(&config.compute_bind)
        .await
        .with_context(|| format!("failed to bind compute server on {}", config.compute_bind))?;
    tokio::spawn(async move {
        tracing::info!("Compute server started");
        axum::serve(listener, agent::compute_routes()).await.ok();
    });

    let agent = Arc::new(Agent::from_config(&config));
    let loops = agent::spawn_loops(agent, config.concurrency);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");
    for handle in loops {
        handle.abort();
    }
    Ok(())
}
