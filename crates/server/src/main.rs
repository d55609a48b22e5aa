//! Tally server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tally_api::{AppState, SiteSettings, router as api_router};
use tally_common::{Config, Fingerprinter};
use tally_core::{
    AdminAuthService, BackupService, VoteService, build_backend, restore_before_start,
    wait_for_worker,
};
use tally_db::repositories::VoteRepository;
use tokio::signal;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Largest accepted request body. Only the vote form has one.
const BODY_LIMIT: usize = 16 * 1024;

/// How often limiter entries and expired sessions are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Wait for shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn load_config() -> Result<Config, tally_common::AppError> {
    match std::env::var("TALLY_CONFIG") {
        Ok(path) => Config::from_file(path),
        Err(_) => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting tally server...");

    // Load configuration
    let config = load_config()?;

    // Bring the database file back from the backup before anything opens it
    let backend = build_backend(&config.backup)?;
    let backup_timeout = Duration::from_secs(config.backup.timeout_secs);
    restore_before_start(backend.as_deref(), &config.database.path, backup_timeout).await;

    // Connect to database
    let db = tally_db::init(&config.database).await?;
    info!(path = %config.database.path.display(), "Connected to database");

    // Run migrations
    info!("Running database migrations...");
    tally_db::migrate(&db).await?;
    info!("Migrations completed");

    let db = Arc::new(db);
    let vote_repo = VoteRepository::new(Arc::clone(&db));

    // Backup worker
    let (backup_service, backup_worker) = BackupService::new(
        backend,
        vote_repo.clone(),
        config.database.path.clone(),
        backup_timeout,
    );
    let backup_worker = if backup_service.is_enabled() {
        info!("Backup worker started");
        Some(tokio::spawn(backup_worker.run()))
    } else {
        None
    };

    // Services
    let vote_service = VoteService::new(
        vote_repo,
        Fingerprinter::new(config.fingerprint.salt.as_str()),
        backup_service.clone(),
    );
    let admin_auth = AdminAuthService::from_config(&config.admin);

    // Periodic cleanup of in-memory admin state
    let sweeper = admin_auth.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweeper.sweep(Utc::now()).await;
        }
    });

    let state = AppState::new(
        vote_service,
        admin_auth,
        backup_service,
        SiteSettings::from_config(&config),
    );

    let app = api_router()
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server with graceful shutdown
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // The router owned the last service handles, so the worker now drains
    // whatever request is still queued and exits.
    if let Some(worker) = backup_worker {
        wait_for_worker(worker, backup_timeout.saturating_mul(2)).await;
    }

    info!("Server shutdown complete");
    Ok(())
}
