use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use nl_query_backend::api::handlers::AppState;
use nl_query_backend::api::routes::create_router;
use nl_query_backend::config::Config;
use nl_query_backend::services::database;
use nl_query_backend::services::{LlmService, QueryPipeline, SchemaProvider, TextGenerator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (also reads .env, so RUST_LOG there applies)
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_ansi(config.logging.style != "never")
        .init();

    let store = database::connect_from_config(&config);
    if store.is_none() {
        warn!("DATABASE_URL not set or unusable, serving sample schema and data");
    }

    let llm: Arc<dyn TextGenerator> = Arc::new(LlmService::new(&config));
    if !config.llm_enabled() {
        warn!("LLM_API_KEY not set, using rule-based SQL and template answers");
    }

    let schema_provider = Arc::new(SchemaProvider::new(store.clone(), config.schema_cache_ttl()));
    let pipeline = Arc::new(QueryPipeline::new(schema_provider.clone(), llm.clone(), store));

    let addr: SocketAddr = config
        .server_address()
        .parse()
        .with_context(|| format!("Invalid server address {}", config.server_address()))?;

    let app = create_router(AppState {
        pipeline,
        schema_provider,
        llm,
        config,
    });

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!("Failed to bind {}: {}", addr, e);
        e
    })?;
    axum::serve(listener, app).await?;

    Ok(())
}
