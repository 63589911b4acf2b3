// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

mod analysis;
mod api;
mod config;
mod error;
mod export;
mod health;
mod history;
mod metrics;
mod model;
mod parameters;
mod progress;
mod workflow;

use std::sync::Arc;

use analysis::{AnalysisService, HttpAnalysisClient};
use api::AppState;
use config::{AppConfig, HistoryBackend, LogFormat};
use health::HealthMonitor;
use history::{FileStorage, HistoryStore, RedisStorage};
use metrics::Metrics;
use progress::ProgressHub;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use workflow::Workflow;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cfg = AppConfig::from_env()?;
    init_tracing(cfg.log_format);

    let metrics = Metrics::new()?;
    let history = open_history(&cfg.history).await?;
    metrics.update_history_size(history.len().await);

    let client = HttpAnalysisClient::try_new(cfg.analysis())?;
    tracing::info!(api_url = %client.base_url(), "using analysis service");
    let service: Arc<dyn AnalysisService> = Arc::new(client);

    let mut monitor = HealthMonitor::spawn(service.clone(), metrics.clone(), cfg.health_interval());

    let workflow = Workflow::new(
        service,
        history,
        ProgressHub::new(cfg.progress_step),
        metrics.clone(),
    );

    let state = AppState {
        workflow,
        metrics,
        upstream: monitor.subscribe(),
    };

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listen_addr = cfg.listen_addr();
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    tracing::info!(%listen_addr, "starting compost analyzer");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.stop();
    tracing::info!("compost analyzer exited cleanly");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn open_history(backend: &HistoryBackend) -> anyhow::Result<HistoryStore> {
    let store = match backend {
        HistoryBackend::File { path } => HistoryStore::open(FileStorage::new(path)).await,
        HistoryBackend::Redis { url, key } => {
            let storage = RedisStorage::new(url, key.clone())?;
            if let Err(error) = storage.ping().await {
                tracing::warn!(
                    %error,
                    "redis unavailable; history will not persist until it returns"
                );
            }
            HistoryStore::open(storage).await
        }
    };
    Ok(store)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term_signal) => term_signal.recv().await,
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler");
                None
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
