use std::sync::Arc;

use calc_grid::config::CoordinatorConfig;
use calc_grid::coordinator::{self, AppState, Coordinator, StaticTokens};
use calc_grid::store::{ExpressionStore, LibSqlBackend};
use calc_grid::tasks;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = CoordinatorConfig::try_from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("🧮 calc-grid coordinator v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}/expressions", config.bind);
    eprintln!("   Tasks: http://{}/internal/task", config.bind);
    eprintln!(
        "   Evaluation: {} workers, queue {}, dispatch {}",
        config.eval_workers,
        config.eval_queue,
        if config.dispatch_tasks { "on" } else { "off" }
    );
    eprintln!(
        "   Task lease: {}s (sweep every {}s)",
        config.task_lease.as_secs(),
        config.sweep_interval.as_secs()
    );

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn ExpressionStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Coordinator ──────────────────────────────────────────────────────
    let coordinator = Coordinator::from_config(Arc::clone(&store), &config);

    // Startup recovery: re-queue expressions left pending by a previous run
    let recovered = coordinator.recover_pending().await?;
    if recovered > 0 {
        eprintln!("   Recovered {} pending expressions from DB", recovered);
    }

    // Spawn lease sweep so abandoned tasks are re-offered
    let _sweep_handle =
        tasks::spawn_lease_sweep(Arc::clone(coordinator.board()), config.sweep_interval);

    let identities = StaticTokens::new(config.user_tokens.clone());
    if identities.is_empty() {
        eprintln!("   Warning: CALC_USER_TOKENS is empty, every owner request will be rejected");
    }

    let app = coordinator::router(AppState {
        coordinator,
        identities: Arc::new(identities),
        agent_secret: config.agent_secret.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(bind = %config.bind, "Coordinator listening");
    eprintln!();

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown requested");
        })
        .await?;

    Ok(())
}
