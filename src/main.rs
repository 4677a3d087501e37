//! Meshgate Server: time-bounded cluster access for mesh identities
//!
//! Main entry point that wires all crates together and starts the server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use meshgate_access::{AccessProvisioner, CredentialIssuer, MemoryAccessApi, NameResolver};
use meshgate_api::AppState;
use meshgate_auth::{CapabilityExtractor, SignInManager, StaticIdentityResolver};
use meshgate_core::config::AppConfig;
use meshgate_core::error::AppError;
use meshgate_core::traits::{AccessApi, Clock, IdentityResolver, RecordStore, SystemClock};
use meshgate_store::MemoryRecordStore;
use meshgate_worker::jobs::{OrphanSweepJob, ResyncJob};
use meshgate_worker::{CronScheduler, ReconcileRunner, Reconciler};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from `config/default.toml`, the environment overlay,
/// and `MESHGATE__*` variables
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("MESHGATE_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Meshgate v{}", env!("CARGO_PKG_VERSION"));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 1: Stores and downstream API ────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
    let access_api: Arc<dyn AccessApi> = Arc::new(MemoryAccessApi::new());
    tracing::info!("Using in-memory record store and access API");

    // ── Step 2: Access provisioning ──────────────────────────────
    let names = NameResolver::new(&config.access.name_prefix);
    let provisioner = AccessProvisioner::new(
        Arc::clone(&access_api),
        names.clone(),
        config.access.cluster.namespace.clone(),
    )
    .with_span(tracing::info_span!("provisioner", namespace = %config.access.cluster.namespace));
    let credentials = Arc::new(CredentialIssuer::new(
        Arc::clone(&store),
        Arc::clone(&access_api),
        names,
        config.access.cluster.clone(),
        Arc::clone(&clock),
    ));

    // ── Step 3: Reconciler, workers, and scheduled tasks ─────────
    let reconciler = Arc::new(
        Reconciler::new(
            Arc::clone(&store),
            provisioner.clone(),
            Arc::clone(&clock),
            config.access.retention,
        )
        .with_span(tracing::info_span!("reconciler", retention = %config.access.retention)),
    );
    let runner = Arc::new(ReconcileRunner::new(
        reconciler,
        Arc::clone(&store),
        config.reconciler.clone(),
    ));

    let mut scheduler = CronScheduler::new(
        ResyncJob::new(Arc::clone(&runner)),
        OrphanSweepJob::new(
            Arc::clone(&store),
            provisioner,
            Arc::clone(&clock),
            runner.queue(),
        ),
    )
    .await?;
    scheduler.register_default_tasks(&config.reconciler).await?;
    scheduler.start().await?;

    let runner_handle = {
        let runner = Arc::clone(&runner);
        let cancel = shutdown_rx.clone();
        tokio::spawn(async move { runner.run(cancel).await })
    };
    tracing::info!(
        "Reconciler started (retention: {})",
        config.access.retention
    );

    // ── Step 4: Identity and sign-in ─────────────────────────────
    let identity: Arc<dyn IdentityResolver> =
        Arc::new(StaticIdentityResolver::from_config(&config.identity)?);
    let capabilities = Arc::new(CapabilityExtractor::new(
        config.access.capability_key.clone(),
    ));
    let signin = Arc::new(
        SignInManager::new(Arc::clone(&store), Arc::clone(&clock), &config.reconciler)
            .with_span(tracing::info_span!("signin")),
    );

    // ── Step 5: Build and start HTTP server ──────────────────────
    let app_state = AppState {
        config: Arc::new(config.clone()),
        identity,
        capabilities,
        signin,
        credentials,
    };
    let app = meshgate_api::build_router(app_state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("Meshgate server listening on {}", addr);

    // ── Step 6: Graceful shutdown ────────────────────────────────
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
    })
    .await
    .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    // In-flight requests are done; stop reconciling and drain.
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown failed: {}", e);
    }

    tracing::info!("Waiting for background tasks to complete...");
    let grace = std::time::Duration::from_secs(config.server.shutdown_grace_seconds);
    if tokio::time::timeout(grace, runner_handle).await.is_err() {
        tracing::warn!("Reconciler did not stop within {}s", grace.as_secs());
    }

    tracing::info!("Meshgate server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
