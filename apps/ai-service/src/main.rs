mod config;
mod context;
mod db;
mod errors;
mod llm_client;
mod models;
mod routes;
mod state;
mod workflow;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::context::loaders::load_prompt_template;
use crate::context::store::SqliteContextStore;
use crate::db::create_pool;
use crate::llm_client::pricing::{OpenRouterPricing, PricingCache};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::workflow::Workflow;

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

    info!("Starting Teacher Assist AI Service v{}", env!("CARGO_PKG_VERSION"));

    // Read-only SQLite context store
    let pool = create_pool(&config.database_path, config.database_timeout()).await?;
    let store = Arc::new(SqliteContextStore::new(pool));
    info!("Context store opened: {}", config.database_path.display());

    // Pricing cache shared by every generation
    let pricing_source = Arc::new(OpenRouterPricing::new(
        &config.openrouter_base_url,
        &config.openrouter_api_key,
    )?);
    let pricing = Arc::new(PricingCache::new(pricing_source, config.pricing_cache_ttl()));

    let llm = LlmClient::new(config.llm_config(), pricing)?;
    info!("LLM client initialized (model: {})", llm.model());

    let mut workflow = Workflow::new(
        store,
        Arc::new(llm),
        config.prompt_template_dir.clone(),
        config.max_retry_attempts,
    );

    // Pre-cache the template; requests fall back to reading it themselves.
    let template = load_prompt_template(&config.prompt_template_dir, None).await;
    match template.error {
        None => {
            info!("Prompt template cached from {}", config.prompt_template_dir.display());
            workflow = workflow.with_cached_template(template.value);
        }
        Some(e) => warn!("Prompt template not cached: {}", e.message),
    }

    let state = AppState {
        workflow: Arc::new(workflow),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
