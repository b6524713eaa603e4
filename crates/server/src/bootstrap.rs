use std::sync::Arc;

use rise_agent::llm::{LlmError, OpenAiCompatibleClient};
use rise_agent::prompt::{load_system_prompt, PromptError};
use rise_agent::registry::{QdrantStoreFactory, VectorStores};
use rise_agent::retrieval::{OpenAiEmbeddingClient, RetrievalError};
use rise_agent::runtime::{AgentRuntime, AgentSettings};
use rise_agent::tools::{dealership_tools, LookupInformationTool};
use rise_agent::ConversationStore;
use rise_core::config::{AppConfig, ConfigError, LoadOptions};
use rise_core::negotiation::{ConcessionPolicy, Negotiator};
use rise_db::repositories::ContactRepository;
use rise_db::{connect_from_config, migrations, DbPool, SqlCarRepository, SqlContactRepository};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub agent: Arc<AgentRuntime>,
    pub contacts: Arc<dyn ContactRepository>,
    pub vector_stores: Arc<VectorStores>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        agent = %config.agent.name,
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.database_ready",
        correlation_id = "bootstrap",
        "database connected and migrated"
    );

    let cars = Arc::new(SqlCarRepository::new(db_pool.clone()));
    let contacts: Arc<dyn ContactRepository> = Arc::new(SqlContactRepository::new(db_pool.clone()));
    let negotiator = Negotiator::new(cars.clone(), ConcessionPolicy::default());

    let embedder = Arc::new(OpenAiEmbeddingClient::from_config(&config.llm)?);
    let factory = QdrantStoreFactory::new(config.vector_store.clone(), embedder);
    let vector_stores = Arc::new(VectorStores::new(Arc::new(factory)));
    let collection = config.vector_store.collection_name(&config.agent).to_string();
    if let Err(error) = vector_stores.warm(&collection).await {
        warn!(
            event_name = "system.bootstrap.vector_store_unavailable",
            correlation_id = "bootstrap",
            collection = %collection,
            error = %error,
            "vector store not warmed; lookups will retry on demand"
        );
    }
    let lookup = LookupInformationTool::new(
        Arc::clone(&vector_stores),
        collection,
        config.vector_store.top_k,
    );

    let tools = dealership_tools(cars, negotiator, lookup);
    let llm = Arc::new(OpenAiCompatibleClient::from_config(&config.llm)?);
    let settings = AgentSettings::from_config(&config.agent, load_system_prompt(&config.agent)?);
    let agent = Arc::new(AgentRuntime::new(
        llm,
        tools,
        ConversationStore::new(config.agent.max_history_messages),
        settings,
    ));

    info!(
        event_name = "system.bootstrap.agent_ready",
        correlation_id = "bootstrap",
        tools = agent.tools().len(),
        llm_provider = ?config.llm.provider,
        model = %config.llm.model,
        "agent runtime assembled"
    );

    Ok(Application { config, db_pool, agent, contacts, vector_stores })
}
