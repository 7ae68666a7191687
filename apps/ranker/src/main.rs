mod config;
mod errors;
mod llm_client;
mod ranking;
mod report;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::gateway::{GatewayTimeouts, ModelGateway};
use crate::llm_client::gemini::GeminiClient;
use crate::llm_client::AnthropicClient;
use crate::ranking::extract::BatchLimits;
use crate::ranking::pipeline::RankingPipeline;
use crate::report::MarkdownReport;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume ranker v{}", env!("CARGO_PKG_VERSION"));

    // Primary backends. The transport timeout sits just above the gateway's
    // own deadline so the gateway reports the timeout class.
    let gemini = GeminiClient::new(
        config.gemini_api_key.clone(),
        config.model_timeout + std::time::Duration::from_secs(5),
    )?;
    let mut gateway = ModelGateway::new(
        config.gemini_models.iter().cloned(),
        Arc::new(gemini),
        GatewayTimeouts {
            probe: config.probe_timeout,
            completion: config.model_timeout,
        },
    );
    info!("Model candidates: {}", config.gemini_models.join(", "));

    // Secondary provider is optional
    match &config.anthropic_api_key {
        Some(key) => {
            let anthropic = AnthropicClient::new(key.clone(), config.model_timeout)?;
            gateway = gateway.with_secondary(Arc::new(anthropic));
            info!("Secondary provider enabled (model: {})", llm_client::ANTHROPIC_MODEL);
        }
        None => info!("Secondary provider disabled (ANTHROPIC_API_KEY not set)"),
    }

    let pipeline = RankingPipeline::new(
        Arc::new(gateway),
        BatchLimits {
            max_resumes: config.max_resumes,
            max_chars: config.max_resume_chars,
        },
    );

    // Build app state
    let state = AppState {
        pipeline: Arc::new(pipeline),
        exporter: Arc::new(MarkdownReport),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
