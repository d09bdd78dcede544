use anyhow::{Context, Result};
use clap::Parser;
use drwatson_voice::{create_router, AppState, Config};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "drwatson-voice", about = "Voice conversation service", version)]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(short, long, default_value = "config/drwatson-voice")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} starting", cfg.service.name);
    info!("Speech proxy: {}", cfg.pipeline.base_url);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(cfg);
    let router = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .context("HTTP server failed")?;

    Ok(())
}

/// Wait for Ctrl-C, then wind every conversation down
async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }

    info!("Shutting down");

    let sessions: Vec<_> = {
        let mut sessions = state.sessions.write().await;
        sessions.drain().collect()
    };

    for (session_id, session) in sessions {
        info!("Closing conversation: {}", session_id);
        session.shutdown().await;
    }
}
