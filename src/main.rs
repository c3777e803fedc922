mod auth;
mod config;
mod error;
mod models;
mod routes;
mod services;

use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::Config;
use crate::routes::AppState;
use crate::services::library::Library;
use crate::services::llm::LlmClient;
use crate::services::share::ShareStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::from_env();
    let bind_addr = config.bind_addr.clone();
    if config.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set, generation endpoints will fail");
    }

    let state = AppState {
        llm: Arc::new(LlmClient::new(&config)),
        share: Arc::new(ShareStore::new()),
        library: Arc::new(Library::new(config.data_dir.clone())?),
        config: Arc::new(config),
    };

    let app = routes::router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        )
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
