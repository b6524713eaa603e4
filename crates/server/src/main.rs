mod bootstrap;
mod health;
mod routes;

use std::future::IntoFuture;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use rise_core::config::{AppConfig, LoadOptions};
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::bootstrap::Application;
use crate::routes::GuestState;

fn init_logging(config: &AppConfig) {
    use rise_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

fn app(application: &Application) -> Router {
    let guest = GuestState {
        agent: application.agent.clone(),
        contacts: application.contacts.clone(),
    };

    Router::new()
        .merge(routes::router(guest))
        .merge(health::router(application.db_pool.clone(), application.config.agent.name.clone()))
        .layer(routes::cors_layer(&application.config.server.allowed_origins))
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let application = bootstrap::bootstrap_with_config(config).await?;
    let server = &application.config.server;
    let address = format!("{}:{}", server.bind_address, server.port);
    let grace = Duration::from_secs(server.graceful_shutdown_secs);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "rise-server listening"
    );

    let (stopping_tx, stopping_rx) = oneshot::channel::<()>();
    let serve = axum::serve(listener, app(&application))
        .with_graceful_shutdown(async move {
            wait_for_shutdown().await;
            let _ = stopping_tx.send(());
        })
        .into_future();

    tokio::select! {
        result = serve => result?,
        () = grace_expired(stopping_rx, grace) => {
            tracing::warn!(
                event_name = "system.server.shutdown_forced",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "in-flight requests did not finish within the grace period"
            );
        }
    }

    let released_stores = application.vector_stores.clear();
    application.db_pool.close().await;
    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        released_stores,
        "rise-server stopped"
    );
    Ok(())
}

/// Resolves `grace` after shutdown starts. Never resolves if it does not.
async fn grace_expired(stopping: oneshot::Receiver<()>, grace: Duration) {
    if stopping.await.is_ok() {
        tokio::time::sleep(grace).await;
    } else {
        std::future::pending::<()>().await;
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(event_name = "system.server.signal_error", error = %error, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "shutdown signal received; draining requests"
    );
}
