use anyhow::{Result, Context};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DistanceMetric;
use crate::modules::brain::rag::{point_id, IdeaIndex, ScoredIdea};
use crate::modules::ideas::structs::IdeaRecord;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Ideas in a Postgres table with a pgvector column; payload kept as JSONB.
pub struct PgVectorIdeaIndex {
    pool: PgPool,
    vector_size: u64,
    distance: DistanceMetric,
}

impl PgVectorIdeaIndex {
    pub fn new(pool: PgPool, vector_size: u64, distance: DistanceMetric) -> Self {
        Self { pool, vector_size, distance }
    }

    /// pgvector operator; every one of them orders closest first.
    fn operator(&self) -> &'static str {
        match self.distance {
            DistanceMetric::Cosine => "<=>",
            DistanceMetric::Dot => "<#>",
            DistanceMetric::Euclid => "<->",
        }
    }

    fn score(&self, distance: f64) -> f32 {
        match self.distance {
            DistanceMetric::Cosine => (1.0 - distance) as f32,
            // <#> is the negated inner product
            DistanceMetric::Dot => (-distance) as f32,
            DistanceMetric::Euclid => (-distance) as f32,
        }
    }
}

/// Schema statements with the vector dimension filled in.
pub fn schema_statements(vector_size: u64) -> Vec<String> {
    SCHEMA_SQL
        .replace("{dim}", &vector_size.to_string())
        .split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[async_trait]
impl IdeaIndex for PgVectorIdeaIndex {
    fn backend_name(&self) -> &'static str {
        "pgvector"
    }

    async fn ensure_schema(&self, recreate: bool) -> Result<()> {
        info!("Checking database schema...");
        if recreate {
            warn!("🗑️ Dropping table idea_vectors");
            sqlx::query("DROP TABLE IF EXISTS idea_vectors").execute(&self.pool).await?;
        }
        for stmt in schema_statements(self.vector_size) {
            if let Err(e) = sqlx::query(&stmt).execute(&self.pool).await {
                if !e.to_string().contains("already exists") {
                    return Err(e).with_context(|| format!("schema statement failed: {}", stmt));
                }
            }
        }
        info!("Database schema check complete.");
        Ok(())
    }

    async fn upsert(&self, collection: &str, record: &IdeaRecord, vector: Vec<f32>) -> Result<Uuid> {
        let id = point_id(collection, record.post_id);
        sqlx::query(
            "INSERT INTO idea_vectors (id, collection, post_id, group_name, language, payload, embedding, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) \
             ON CONFLICT (id) DO UPDATE SET group_name = EXCLUDED.group_name, language = EXCLUDED.language, \
             payload = EXCLUDED.payload, embedding = EXCLUDED.embedding, updated_at = NOW()"
        )
        .bind(id)
        .bind(collection)
        .bind(record.post_id)
        .bind(&record.group_name)
        .bind(&record.language)
        .bind(serde_json::to_value(record)?)
        .bind(Vector::from(vector))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get(&self, collection: &str, post_id: i64) -> Result<Option<IdeaRecord>> {
        let row = sqlx::query("SELECT payload FROM idea_vectors WHERE id = $1")
            .bind(point_id(collection, post_id))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => {
                let payload: serde_json::Value = r.try_get("payload")?;
                Ok(Some(serde_json::from_value(payload)?))
            }
            None => Ok(None),
        }
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        group: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredIdea>> {
        let sql = format!(
            "SELECT payload, (embedding {op} $3)::float8 AS distance FROM idea_vectors \
             WHERE collection = $1 AND ($2::text IS NULL OR group_name = $2) \
             ORDER BY embedding {op} $3 LIMIT $4",
            op = self.operator()
        );

        let rows = sqlx::query(&sql)
            .bind(collection)
            .bind(group)
            .bind(Vector::from(vector))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut ideas = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: serde_json::Value = row.try_get("payload")?;
            let distance: f64 = row.try_get("distance")?;
            match serde_json::from_value::<IdeaRecord>(payload) {
                Ok(record) => ideas.push(ScoredIdea { record, score: self.score(distance) }),
                Err(e) => warn!("Skipping unreadable row in '{}': {}", collection, e),
            }
        }
        Ok(ideas)
    }
}
