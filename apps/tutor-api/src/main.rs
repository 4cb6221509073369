//! Tutor API - HTTP service for the EduGen retrieval-augmented tutor
//!
//! Provides REST endpoints for:
//! - Passage retrieval over the curriculum index
//! - Tutor chat (topic overview and question answering)
//! - Grading of free-text answers
//!
//! The index bundle is loaded once at startup; a missing, corrupt or
//! out-of-sync bundle stops the server before it binds.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use retrieval_core::TutorConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod handlers;
mod state;
#[cfg(test)]
mod tests;

use state::AppState;

/// Command-line arguments for the tutor API
#[derive(Parser, Debug)]
#[command(name = "tutor-api")]
#[command(about = "EduGen tutor HTTP service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// TOML configuration file
    #[arg(short, long, env = "TUTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Build the router over shared state
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Retrieval
        .route("/retrieve", post(handlers::retrieve))
        // Tutor
        .route("/chat", post(handlers::chat))
        .route("/evaluate", post(handlers::evaluate))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive(log_level.into())
                .add_directive("tower_http=debug".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TutorConfig::load(args.config.as_deref())?;

    info!("Initializing application state...");
    let state = Arc::new(AppState::from_config(&config).await?);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, router(state)).await?;

    Ok(())
}
