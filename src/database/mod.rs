pub mod pg_index;
pub mod schema;

pub use pg_index::PgVectorIdeaIndex;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use crate::config::{IndexBackend, Secrets, Settings};
use crate::modules::brain::{IdeaIndex, MemoryIdeaIndex, QdrantIdeaIndex};

/// Opens the configured vector index backend.
pub async fn connect_index(settings: &Settings, secrets: &Secrets) -> Result<Arc<dyn IdeaIndex>> {
    let cfg = &settings.index;
    let index: Arc<dyn IdeaIndex> = match cfg.backend {
        IndexBackend::Qdrant => {
            info!("🔗 Connecting to Qdrant at {}", cfg.url);
            Arc::new(QdrantIdeaIndex::new(cfg, secrets.qdrant_api_key.as_deref())?)
        }
        IndexBackend::Pgvector => {
            let Some(db_url) = secrets.database_url.as_deref() else {
                bail!("DATABASE_URL must be set for the pgvector backend");
            };
            let pool = PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(db_url)
                .await
                .map_err(|e| {
                    error!("CRITICAL: DB Connection Failed! Is Postgres running?");
                    e
                })?;
            Arc::new(PgVectorIdeaIndex::new(pool, cfg.vector_size, cfg.distance))
        }
        IndexBackend::Memory => {
            info!("🧠 Using in-memory index; data is lost on restart");
            Arc::new(MemoryIdeaIndex::new(cfg.distance))
        }
    };
    Ok(index)
}
