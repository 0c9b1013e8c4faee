use anyhow::{Context, Result};
use clap::Parser;
use knowva_speech::{
    create_router, AppState, Config, NatsRecognizerFactory, StaticTokenVerifier,
};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "knowva-speech")]
#[command(about = "Real-time speech transcription bridge")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/knowva-speech")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG wins; default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("NATS: {} (transcripts on {})", cfg.nats.url, cfg.nats.transcript_subject);
    info!(
        "Sessions: {}s max, {:?} start, {} auth tokens",
        cfg.session.max_duration_secs,
        cfg.session.start_policy,
        cfg.auth.users.len()
    );

    let verifier = Arc::new(StaticTokenVerifier::new(cfg.auth.token_table()));
    let recognizers = Arc::new(NatsRecognizerFactory::new(
        cfg.nats.clone(),
        Handle::current(),
    ));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(cfg, verifier, recognizers);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}
