use serde::Deserialize;
use config::{Config, Environment, File};
use anyhow::{Context, Result};
use std::env;
use std::fs;

const DEFAULT_CONFIG_FILE: &str = "settings";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Require HTTP Basic credentials on the REST routes and the chat socket.
    pub require_auth: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9000".to_string(),
            require_auth: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    /// Model used for the streamed answer and the follow-up questions.
    pub chat_model: String,
    /// Model used for classification, summaries and memory compaction.
    pub fast_model: String,
    pub embedding_model: String,
    pub moderation_model: Option<String>,
    pub answer_max_tokens: u32,
    pub followup_max_tokens: u32,
    pub classifier_max_tokens: u32,
    pub memory_max_tokens: u32,
    pub temperature: f32,
    pub summary_temperature: f32,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_sec: u64,
    pub stream_timeout_sec: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4".to_string(),
            fast_model: "gpt-3.5-turbo".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            moderation_model: None,
            answer_max_tokens: 1000,
            followup_max_tokens: 128,
            classifier_max_tokens: 128,
            memory_max_tokens: 128,
            temperature: 0.0,
            summary_temperature: 0.2,
            max_attempts: 3,
            retry_delay_ms: 2000,
            request_timeout_sec: 60,
            stream_timeout_sec: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Qdrant,
    Pgvector,
    Memory,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Dot,
    Euclid,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub url: String,
    pub vector_size: u64,
    pub distance: DistanceMetric,
    pub default_collection: String,
    pub localized_collection: String,
    pub localized_languages: Vec<String>,
    pub max_connections: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Qdrant,
            url: "http://localhost:6334".to_string(),
            vector_size: 1536,
            distance: DistanceMetric::Dot,
            default_collection: "posts".to_string(),
            localized_collection: "posts_is".to_string(),
            localized_languages: vec!["is".to_string(), "es".to_string()],
            max_connections: 10,
        }
    }
}

impl IndexConfig {
    /// Collection a post in `language` is written to and searched in.
    pub fn collection_for(&self, language: &str) -> &str {
        if self.localized_languages.iter().any(|l| l.eq_ignore_ascii_case(language)) {
            &self.localized_collection
        } else {
            &self.default_collection
        }
    }

    pub fn collections(&self) -> Vec<&str> {
        let mut all = vec![self.default_collection.as_str()];
        if self.localized_collection != self.default_collection {
            all.push(self.localized_collection.as_str());
        }
        all
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Language whose collection the chat searches.
    pub language: String,
    pub many_ideas_k: usize,
    pub one_idea_k: usize,
    pub points_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { language: "is".to_string(), many_ideas_k: 38, one_idea_k: 8, points_k: 12 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    /// Turns kept word for word.
    pub full_turns: usize,
    /// Summarized turns kept before they are folded into the digest.
    pub summarized_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { full_turns: 1, summarized_turns: 2 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub total_ideas: u32,
    pub reply_language: String,
    /// Language the chat memory summaries and digests are written in.
    pub chat_language: String,
    pub neighborhoods: Vec<String>,
    pub about: String,
    pub system_prompt_path: Option<String>,
    pub about_prompt_path: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "My Neighborhood".to_string(),
            total_ideas: 1710,
            reply_language: "Icelandic".to_string(),
            chat_language: "Icelandic".to_string(),
            neighborhoods: [
                "Vesturbær",
                "Laugardalur",
                "Hlíðar",
                "Grafarvogur (og Bryggjuhverfi)",
                "Háaleiti og Bústaðir",
                "Árbær (og Norðlingaholt)",
                "Breiðholt",
                "Miðborg",
                "Grafarholt og Úlfarsárdalur",
                "Kjalarnes",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            about: "A biennial collaboration between residents and the city administration \
                    that prioritizes funds for neighborhood projects. Residents submit ideas, \
                    an expert committee reviews them, and residents vote electronically."
                .to_string(),
            system_prompt_path: None,
            about_prompt_path: None,
        }
    }
}

impl ProjectConfig {
    /// Prompt override file contents, if one is configured.
    pub fn read_prompt_override(path: &Option<String>) -> Result<Option<String>> {
        match path {
            Some(p) => {
                let text = fs::read_to_string(p).with_context(|| format!("reading prompt file {}", p))?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub memory: MemoryConfig,
    pub project: ProjectConfig,
}

impl Settings {
    /// Loads `settings.toml` (or `$IDEAS_CONFIG`) overlaid with `IDEAS__*` env vars.
    pub fn load() -> Result<Self> {
        let path = env::var("IDEAS_CONFIG").unwrap_or(DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("IDEAS").separator("__"))
            .build()
            .with_context(|| format!("building settings from {}", path))?;

        let parsed: Settings = settings.try_deserialize()?;
        Ok(parsed)
    }
}

/// Credentials that only ever come from the environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub openai_api_key: String,
    pub qdrant_api_key: Option<String>,
    pub database_url: Option<String>,
    pub http_user: Option<String>,
    pub http_password: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            qdrant_api_key: non_empty("QDRANT_API_KEY"),
            database_url: non_empty("DATABASE_URL"),
            http_user: non_empty("HTTP_USER"),
            http_password: non_empty("HTTP_PWD"),
        }
    }
}
