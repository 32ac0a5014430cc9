use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use salesflow_backend::config::Config;
use salesflow_backend::database;
use salesflow_backend::jobs::JobScheduler;
use salesflow_backend::workflows::{
    ActionKind, ActionRegistry, EngineConfig, InMemoryWorkflowStore, JsonConditionEvaluator, LogOnlyHandler,
    PgWorkflowStore, WebhookHandler, WorkflowEngine, WorkflowStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn WorkflowStore> = match &config.database_url {
        Some(url) => {
            let db_pool = database::create_pool(url).await?;
            database::migrate(&db_pool).await?;
            if !database::health_check(&db_pool).await {
                anyhow::bail!("Database health check failed");
            }
            let stats = database::pool_stats(&db_pool);
            tracing::info!("Database ready: {} connections, {} idle", stats.size, stats.idle);
            Arc::new(PgWorkflowStore::new(db_pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, workflow state is kept in memory only");
            Arc::new(InMemoryWorkflowStore::new())
        }
    };

    let webhook = WebhookHandler::new(Duration::from_secs(config.webhook_timeout_seconds))?;
    let registry = ActionRegistry::new()
        .with_handler(ActionKind::WebhookCall, Arc::new(webhook))
        .with_fallback(Arc::new(LogOnlyHandler));

    let engine = Arc::new(WorkflowEngine::new(
        store,
        registry,
        Arc::new(JsonConditionEvaluator),
        EngineConfig::from(&config),
    ));

    let recovered = engine.recover_interrupted().await?;
    if !recovered.is_empty() {
        tracing::info!("Recovered {} interrupted executions", recovered.len());
    }

    let mut scheduler = JobScheduler::new(engine, config.scheduler.clone()).await?;
    scheduler.start().await?;

    tracing::info!("Workflow worker running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    scheduler.shutdown().await?;
    tracing::info!("Workflow worker stopped");

    Ok(())
}
