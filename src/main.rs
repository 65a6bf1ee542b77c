//! MedAgent: server entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Init logger at the configured level
//!   4. Build the LLM provider, log store and orchestrator
//!   5. Spawn Ctrl-C → shutdown signal watcher
//!   6. Run the web channel until shutdown

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use medagent::agents::orchestrator::Orchestrator;
use medagent::error::AppError;
use medagent::llm::providers;
use medagent::report::store::LogStore;
use medagent::runtime::{Component, spawn_components};
use medagent::web::{AppState, WebChannel};
use medagent::{config, logger};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let config = config::load()?;
    logger::init(&config.log_level)?;

    info!(
        app_name = %config.app_name,
        work_dir = %config.work_dir.display(),
        log_level = %config.log_level,
        provider = %config.llm.provider,
        "config loaded"
    );

    let provider = providers::build(&config.llm, config.llm_api_key.clone())?;
    if !provider.has_credentials() {
        warn!("GOOGLE_API_KEY is not set; analyses will fail until it is provided");
    }
    info!(provider = provider.name(), model = provider.model(), "llm provider ready");

    let store = LogStore::open(&config.logs.dir, &config.logs.reports_dir)?;
    info!(
        logs_dir = %config.logs.dir.display(),
        reports_dir = %config.logs.reports_dir.display(),
        "log store ready"
    );

    let orchestrator = Arc::new(Orchestrator::new(provider, store, &config.agents));
    let state = AppState::new(orchestrator, &config.web);

    // Ctrl-C cancels the shared token; every component watches it.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    let components: Vec<Box<dyn Component>> =
        vec![Box::new(WebChannel::new("web", config.web.bind.clone(), state))];

    spawn_components(components, shutdown).join().await?;

    info!("shutdown complete");
    Ok(())
}
