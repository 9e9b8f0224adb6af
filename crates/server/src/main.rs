//! # tabulookup-server
//!
//! HTTP server for the tabulookup lookup engine.

mod error;
mod routes;

use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tabulookup_core::{LookupService, Settings};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabulookup-server")]
#[command(about = "Serve tabulookup datasets over HTTP")]
#[command(version)]
struct Cli {
    /// YAML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind to (overrides settings)
    #[arg(short, long)]
    bind: Option<String>,
}

/// Health check response.
#[derive(Serialize, Deserialize)]
pub struct Health {
    /// Server status ("ok" when healthy).
    pub status: String,
    /// Server version from Cargo.toml.
    pub version: String,
}

/// Health check endpoint handler.
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create the application router.
///
/// This is separated from `main()` to allow testing.
pub fn create_router(service: LookupService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/get-sheets", get(routes::get_sheets))
        .route("/api/get-columns", get(routes::get_columns))
        .route("/api/fetch-results", post(routes::fetch_results))
        .route(
            "/api/datasets",
            get(routes::list_datasets).post(routes::register_dataset),
        )
        .route("/api/datasets/:id", delete(routes::delete_dataset))
        .route("/api/datasets/:id/toggle", post(routes::toggle_dataset))
        .route(
            "/api/datasets/:id/sheets/:sheet/config",
            get(routes::get_sheet_config).post(routes::set_sheet_config),
        )
        .route("/api/analytics", get(routes::analytics))
        .route("/api/queries", get(routes::recent_queries))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        settings.bind = bind;
    }

    let addr = settings.bind.clone();
    let service = LookupService::from_settings(settings).await?;
    info!(
        datasets = service.datasets().await.len(),
        "tabulookup-server listening on {addr}"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, create_router(service)).await?;

    Ok(())
}
