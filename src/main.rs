//! Layered Cache - admin server
//!
//! Runs a [`CacheService`] behind a small HTTP surface for inspection and
//! manual invalidation.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use layered_cache::api::create_router;
use layered_cache::remote::{MemoryStore, RedisStore, RemoteStore};
use layered_cache::{spawn_cleanup_task, spawn_health_task, AppState, CacheService, Config};

/// # Startup Sequence
/// 1. Initialize tracing
/// 2. Load configuration from environment variables
/// 3. Connect the remote store (Redis, or in-process when unset)
/// 4. Build the cache service and start the health and cleanup tasks
/// 5. Serve the admin API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "layered_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting layered cache");

    let config = Config::from_env();
    info!(
        prefix = %config.key_prefix,
        local_capacity = config.local_capacity,
        default_ttl_secs = config.default_ttl.as_secs(),
        port = config.server_port,
        "Configuration loaded"
    );

    let store: Arc<dyn RemoteStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisStore::connect(url)
                .await
                .with_context(|| format!("failed to connect to redis at {}", url))?,
        ),
        None => {
            warn!("REDIS_URL not set, using in-process remote store");
            Arc::new(MemoryStore::new())
        }
    };

    let service = Arc::new(CacheService::new(&config, store));
    let tasks = vec![
        spawn_health_task(service.health_monitor(), config.health_check_interval),
        spawn_cleanup_task(Arc::clone(service.local()), config.cleanup_interval),
    ];
    info!("Background tasks started");

    let app = create_router(AppState::new(Arc::clone(&service)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tasks))
        .await
        .context("server error")?;

    service.flush_background().await;
    service.background().shutdown();
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then aborts the periodic tasks.
async fn shutdown_signal(tasks: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for task in tasks {
        task.abort();
    }
    warn!("Background tasks aborted");
}
