mod api_doc;
mod coerce;
mod config;
mod endpoints;
mod error;
mod handlers;
mod moodle;
mod router;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use config::Config;
use moodle::MoodleClient;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!("moodleware starting");
    config.log_startup();

    // A partially invalid route table must never serve; load() reports
    // every offending entry at once.
    let specs = endpoints::load(&config.endpoints_file)?;
    let routes = router::compile(specs);
    tracing::info!(
        "Compiled {} routes from {}",
        routes.len(),
        config.endpoints_file
    );

    let moodle = MoodleClient::new(Duration::from_secs(config.request_timeout_secs))?;

    let addr = format!("{}:{}", config.service_host, config.service_port);
    let state = AppState {
        config: Arc::new(config),
        moodle,
        routes: Arc::new(routes),
    };
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
