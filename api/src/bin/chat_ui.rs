//! Browser front end. Serves a single page that calls the API server.

use anyhow::Context;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use rag_chat::Endpoints;

const PAGE: &str = include_str!("../../static/index.html");

fn render_page(api_base_url: &str) -> String {
    PAGE.replace("{{API_BASE_URL}}", api_base_url)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let endpoints = Endpoints::from_env().context("invalid endpoint configuration")?;
    let page = Html(render_page(&endpoints.api_base_url()));
    let app = Router::new().route(
        "/",
        get(move || {
            let page = page.clone();
            async move { page }
        }),
    );

    let addr = endpoints.ui_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    log::info!(
        "Chat UI on http://{} (API at {})",
        listener.local_addr()?,
        endpoints.api_base_url()
    );
    axum::serve(listener, app).await?;
    Ok(())
}
