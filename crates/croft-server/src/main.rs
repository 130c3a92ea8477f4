use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "croft=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let host = std::env::var("CROFT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CROFT_PORT")
        .unwrap_or_else(|_| "4700".into())
        .parse()?;
    let db_path: PathBuf = std::env::var("CROFT_DB_PATH")
        .unwrap_or_else(|_| "croft.db".into())
        .into();
    let voice_dir: PathBuf = std::env::var("CROFT_VOICE_DIR")
        .unwrap_or_else(|_| "./voice-storage".into())
        .into();
    let sweep_secs: u64 = std::env::var("CROFT_TYPING_SWEEP_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);

    let state = croft_server::build_state(&db_path, voice_dir).await?;

    // Background stale-typing sweeper
    tokio::spawn(croft_server::sweeper::run_typing_sweeper(
        state.clone(),
        Duration::from_secs(sweep_secs),
    ));

    let app = croft_server::build_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Croft hub listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
