//! Lifecycle orchestration: init tracing, build state, run the proxy and
//! admin listeners side by side, block for a shutdown signal, drain.

use crate::config::RouterConfig;
use crate::metrics::Metrics;
use crate::registry::InMemoryRegistry;
use crate::server::{self, RouterState};
use crate::varz::MetricsVarz;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// CLI arguments forwarded from `main()`.
pub struct BootstrapArgs {
    pub config_path: Option<PathBuf>,
}

/// Proxy lifecycle: init → serve → shutdown.
pub async fn run(args: BootstrapArgs) -> Result<()> {
    init_tracing();

    let config = RouterConfig::load(args.config_path.as_deref())?;
    let listen = config.listen;
    let admin_listen = config.admin_listen;

    let registry = Arc::new(InMemoryRegistry::new());
    let varz = Arc::new(MetricsVarz::new());
    let metrics = Metrics::install();
    let state = RouterState::new(config, registry, varz, metrics);

    let shutdown = Arc::new(Notify::new());

    tokio::spawn({
        let state = state.clone();
        async move {
            if let Err(err) = server::run_admin_server(admin_listen, state).await {
                tracing::error!("server: admin failed, error={}", err);
            }
        }
    });

    tracing::info!("server: starting proxy, listen={}", listen);
    let proxy_handle = tokio::spawn({
        let state = state.clone();
        let shutdown = shutdown.clone();
        async move { server::run_proxy_server(listen, state, shutdown).await }
    });

    wait_for_shutdown(&shutdown).await;

    if let Err(err) = proxy_handle.await {
        tracing::error!("server: proxy task error: {}", err);
    }

    tracing::info!("server: shutdown complete");
    Ok(())
}

fn init_tracing() {
    let (non_blocking, guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();

    // Leaked deliberately: the writer guard must outlive every subsequent
    // log line, and this process never tears the subscriber back down.
    std::mem::forget(guard);
}

async fn wait_for_shutdown(shutdown: &Arc<Notify>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("server: received SIGINT, shutting down"),
        _ = terminate => tracing::info!("server: received SIGTERM, shutting down"),
    }

    shutdown.notify_waiters();
}
