//! Server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use babelroom_cache::RoomCache;
use babelroom_config::{load_settings, Settings};
use babelroom_core::SpeechToText as _;
use babelroom_pipeline::{build_engines, warmup, OpTimeouts, RoomProcessorManager};
use babelroom_server::{create_router, metrics, session::SessionRegistry, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env} > config/default > defaults
    let env = std::env::var("BABELROOM_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };
    let settings = Arc::new(settings);

    init_tracing(&settings);

    tracing::info!("Starting babelroom server v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = metrics::init_metrics();

    // Engines and the async bridge; fatal when nothing can be built
    let (engines, bridge) = build_engines(&settings)?;
    tracing::info!(
        stt = %engines.stt.display_name(),
        translation = ?settings.translation.backend,
        port = settings.server.port,
        "backends selected"
    );

    warmup(&engines).await;

    let cache = Arc::new(RoomCache::new(
        Duration::from_secs(settings.cache.ttl_secs),
        Duration::from_secs(settings.cache.cleanup_interval_secs),
    ));
    let _sweeper = cache.start_sweeper();

    let processors = Arc::new(RoomProcessorManager::new(
        Arc::clone(&cache),
        engines.clone(),
        settings.pipeline.parallel_workers,
        OpTimeouts::from_settings(&settings),
    ));

    let sessions = Arc::new(SessionRegistry::new());

    let state = AppState::new(
        Arc::clone(&settings),
        cache,
        processors,
        sessions,
        engines,
        bridge,
    );

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("{level},hyper=warn,tower_http=info").into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
