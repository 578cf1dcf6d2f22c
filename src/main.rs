use anyhow::Context;
use diesel_migrations::MigrationHarness;
use log::info;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use triageserver::api;
use triageserver::approval::ApprovalCoordinator;
use triageserver::email::{Notifier, SmtpNotifier};
use triageserver::llm::{Generator, LlmGenerator};
use triageserver::ml::{HttpPredictor, Predictor};
use triageserver::retrieval::{QdrantRetriever, Retriever};
use triageserver::shared::config::AppConfig;
use triageserver::shared::locks::TicketLocks;
use triageserver::shared::state::AppState;
use triageserver::shared::utils::{create_conn, MIGRATIONS};
use triageserver::triage::TriageOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;

    let conn = create_conn(&config.database.url, config.database.max_connections)
        .context("failed to create database pool")?;
    {
        let mut migration_conn = conn.get()?;
        migration_conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    }
    info!("database ready");

    let predictor: Arc<dyn Predictor> = Arc::new(HttpPredictor::new(&config.predictor));
    let retriever: Arc<dyn Retriever> = Arc::new(QdrantRetriever::new(&config.retrieval)?);
    let generator: Arc<dyn Generator> = Arc::new(LlmGenerator::new(&config.llm));
    let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::new(config.smtp.clone()));

    let locks = TicketLocks::new();
    let orchestrator = Arc::new(TriageOrchestrator::new(
        conn.clone(),
        locks.clone(),
        predictor,
        retriever,
        generator,
        &config,
    ));
    let coordinator = Arc::new(ApprovalCoordinator::new(
        conn.clone(),
        locks,
        notifier,
        &config,
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        conn,
        orchestrator,
        coordinator,
    });

    let app = api::configure_routes()
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("triage server listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
