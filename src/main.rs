use std::sync::Arc;

use anyhow::{bail, Context};
use dotenvy::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use idea_assistant::config::{Secrets, Settings};
use idea_assistant::database::connect_index;
use idea_assistant::modules::brain::prompts::PromptBook;
use idea_assistant::modules::brain::OpenAiClient;
use idea_assistant::modules::chat::{ChatEngine, SessionRegistry};
use idea_assistant::modules::gateway::{self, AppState};
use idea_assistant::modules::ideas::summarizer::Summarizer;
use idea_assistant::modules::ideas::IdeaIngestor;
use idea_assistant::utils::auth::BasicAuth;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("Starting idea assistant v{}...", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load().context("loading settings")?;
    let secrets = Secrets::from_env();

    let llm = Arc::new(OpenAiClient::new(&settings.llm, secrets.openai_api_key.clone())?);
    let index = connect_index(&settings, &secrets).await?;
    if let Err(e) = index.ensure_schema(false).await {
        error!("❌ Index schema check failed ({}): {:#}", index.backend_name(), e);
    }

    let prompts = Arc::new(PromptBook::new(&settings.project)?);
    let engine = Arc::new(ChatEngine::new(llm.clone(), index.clone(), prompts, &settings));
    let summarizer = Summarizer::new(llm.clone(), &settings.llm);
    let ingestor = Arc::new(IdeaIngestor::new(llm, index.clone(), summarizer, settings.index.clone()));

    let auth = if settings.server.require_auth {
        match BasicAuth::from_secrets(&secrets) {
            Some(a) => Some(a),
            None => bail!("server.require_auth is set but HTTP_USER / HTTP_PWD are missing"),
        }
    } else {
        warn!("🔓 Authentication disabled; REST routes and chat socket are open");
        None
    };

    let state = AppState {
        engine,
        ingestor,
        sessions: SessionRegistry::new(),
        auth,
        backend: index.backend_name(),
        default_language: Arc::from(settings.retrieval.language.as_str()),
    };

    gateway::serve(state, &settings.server.bind).await
}
