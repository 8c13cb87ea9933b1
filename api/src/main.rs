mod error;
mod payloads;
mod routes;
mod state;

use anyhow::Context;
use rag_chat::{Config, RagSystem};
use state::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize environment variables and logging
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env().context("invalid configuration")?;
    config.log_summary();

    let system = RagSystem::connect(&config)
        .await
        .context("failed to initialize RAG system")?;
    log::info!("RAG system initialized successfully");

    let app = routes::router(Arc::new(AppState::new(system, &config)));

    let addr = config.endpoints.api_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    log::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
