mod config;
mod error;
mod extractor;
mod gemini;
mod intent;
mod models;
mod orchestrator;
mod planner;
mod policy;
mod render;
mod routes;
mod session;
mod template;

use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    config::Config,
    extractor::{FieldExtractor, LlmExtractor, PatternExtractor},
    gemini::GeminiClient,
    orchestrator::Orchestrator,
    render::TemplatedClient,
    routes::{app, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    let extractor: Arc<dyn FieldExtractor> = if config.demo_extraction() {
        tracing::info!("Using demo mode - pattern-based field extraction");
        Arc::new(PatternExtractor)
    } else {
        let key = &config.gemini_api_key;
        tracing::info!("Using Gemini API key: {}...", key.chars().take(10).collect::<String>());
        let client = GeminiClient::new(
            key.clone(),
            config.gemini_api_base.clone(),
            config.gemini_model.clone(),
            config.extractor_timeout,
        );
        Arc::new(LlmExtractor::new(Arc::new(client), config.history_window))
    };
    let renderer = TemplatedClient::new(
        config.templated_api_key.clone(),
        config.templated_api_base.clone(),
        config.template_ids.clone(),
        config.render_timeout,
    );

    let state = AppState {
        store: Arc::default(),
        orchestrator: Arc::new(Orchestrator::new(
            extractor,
            Arc::new(renderer),
            config.extractor_timeout,
            config.render_timeout,
        )),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
