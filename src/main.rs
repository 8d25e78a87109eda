//! Trivia Back binary entrypoint wiring the HTTP adapter, question service and snapshot storage.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trivia_back::{
    config::EngineConfig,
    dao::snapshot_store::file::FileSnapshotStore,
    generator::http::HttpQuestionService,
    routes,
    services::session_service,
    state::{SessionContext, SharedContext},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = EngineConfig::load();
    let http_config = config
        .http_service()
        .context("no question service configured; set TRIVIA_GENERATION_URL")?;
    let service = HttpQuestionService::new(http_config).context("building question service")?;
    let snapshots = FileSnapshotStore::new(config.snapshot_dir().clone());

    let context = SessionContext::new(config, Arc::new(service), Arc::new(snapshots));
    if let Some(snapshot) = session_service::restore_if_available(&context).await {
        info!(phase = ?snapshot.phase, "resuming persisted session");
    }
    context.start_sweeper();

    let app = build_router(context);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(context: SharedContext) -> Router<()> {
    routes::router(context)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
