//! Conversion worker process.
//!
//! Consumes queued job ids and drives each job's dispatch loop against
//! the external conversion service. Pairs with a front-end process that
//! validates plans, creates jobs, and enqueues them.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use restack_convert::HttpConvertClient;
use restack_engine::{EngineConfig, JobDispatcher, JobManager, MemoryQueue, QueueWorker};
use restack_events::{EventBus, ProgressHub};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "restack_worker=debug,restack_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = EngineConfig::from_env();
    tracing::info!(
        max_concurrent = config.max_concurrent,
        max_retries = config.retry.max_retries,
        task_timeout_secs = config.task_timeout.as_secs(),
        "Loaded engine configuration",
    );

    let converter_url =
        std::env::var("CONVERTER_API_URL").expect("CONVERTER_API_URL must be set");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = restack_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    restack_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    restack_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Engine wiring ---
    let store = Arc::new(restack_db::PgJobStore::new(pool));
    let service = Arc::new(HttpConvertClient::new(converter_url));
    let bus = Arc::new(EventBus::default());
    let hub = Arc::new(ProgressHub::new());

    let manager = Arc::new(JobManager::new(store, service, bus, hub, config));

    // Surface jobs interrupted by the previous shutdown before taking
    // new work.
    let interrupted = manager
        .recover()
        .await
        .expect("Job recovery failed");
    if interrupted > 0 {
        tracing::warn!(interrupted, "Marked interrupted jobs as failed");
    }

    // --- Queue worker + dispatcher ---
    let queue = Arc::new(MemoryQueue::new());
    let worker = QueueWorker::new(queue.clone(), Arc::clone(&manager));
    let dispatcher = JobDispatcher::new(Arc::clone(&manager), queue);

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_cancel).await });
    let dispatcher_cancel = cancel.clone();
    let dispatcher_handle = tokio::spawn(async move { dispatcher.run(dispatcher_cancel).await });

    tracing::info!("Worker started");
    shutdown_signal().await;

    // --- Graceful shutdown ---
    cancel.cancel();
    let _ = dispatcher_handle.await;
    let _ = worker_handle.await;
    manager.shutdown().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the worker
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
