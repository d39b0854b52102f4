use anyhow::{Result, anyhow, Context};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{info, warn};
use qdrant_client::{
    Qdrant,
    Payload,
    qdrant::{
        value::Kind, vectors_config::Config, Condition, CreateCollection, CreateFieldIndexCollection,
        DeleteCollection, Distance, Filter, GetPoints, PointStruct, SearchPoints, UpsertPoints,
        Value as QdrantValue, VectorParams, VectorsConfig,
    },
};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use crate::config::settings::IndexConfig;
use crate::config::DistanceMetric;
use crate::database::schema::{qdrant_field_type, IDEA_FIELDS};
use crate::modules::ideas::structs::IdeaRecord;

/// A stored idea and its similarity to the query vector (higher is closer).
#[derive(Debug, Clone)]
pub struct ScoredIdea {
    pub record: IdeaRecord,
    pub score: f32,
}

/// Vector index holding one record per idea and collection.
#[async_trait]
pub trait IdeaIndex: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Creates collections / tables and payload indexes. `recreate` drops existing data first.
    async fn ensure_schema(&self, recreate: bool) -> Result<()>;

    /// Writes `record` under its deterministic point id and returns that id.
    async fn upsert(&self, collection: &str, record: &IdeaRecord, vector: Vec<f32>) -> Result<Uuid>;

    async fn get(&self, collection: &str, post_id: i64) -> Result<Option<IdeaRecord>>;

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        group: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredIdea>>;
}

/// UUIDv5 over the DNS namespace of `collection` followed by the post id.
pub fn point_id(collection: &str, post_id: i64) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, format!("{}{}", collection, post_id).as_bytes())
}

pub struct QdrantIdeaIndex {
    qdrant: Qdrant,
    collections: Vec<String>,
    vector_size: u64,
    distance: DistanceMetric,
}

impl QdrantIdeaIndex {
    pub fn new(config: &IndexConfig, api_key: Option<&str>) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let qdrant = builder.build()?;

        Ok(Self {
            qdrant,
            collections: config.collections().into_iter().map(str::to_string).collect(),
            vector_size: config.vector_size,
            distance: config.distance,
        })
    }

    fn qdrant_distance(&self) -> Distance {
        match self.distance {
            DistanceMetric::Cosine => Distance::Cosine,
            DistanceMetric::Dot => Distance::Dot,
            DistanceMetric::Euclid => Distance::Euclid,
        }
    }

    async fn ensure_collection(&self, name: &str, recreate: bool) -> Result<()> {
        let exists = self.qdrant.collection_exists(name).await?;
        if exists && recreate {
            warn!("🗑️ Dropping Qdrant collection '{}'", name);
            self.qdrant.delete_collection(DeleteCollection {
                collection_name: name.to_string(),
                ..Default::default()
            }).await?;
        }
        if exists && !recreate {
            return Ok(());
        }

        info!("📦 Creating Qdrant collection '{}' with dim {}...", name, self.vector_size);
        self.qdrant.create_collection(CreateCollection {
            collection_name: name.into(),
            vectors_config: Some(VectorsConfig {
                config: Some(Config::Params(VectorParams {
                    size: self.vector_size,
                    distance: self.qdrant_distance().into(),
                    ..Default::default()
                })),
            }),
            ..Default::default()
        }).await?;

        for field in IDEA_FIELDS.iter().filter(|f| f.filterable) {
            let Some(field_type) = qdrant_field_type(field.kind) else { continue };
            self.qdrant.create_field_index(CreateFieldIndexCollection {
                collection_name: name.to_string(),
                field_name: field.name.to_string(),
                field_type: Some(field_type.into()),
                wait: Some(true),
                ..Default::default()
            }).await.with_context(|| format!("indexing payload field {}", field.name))?;
        }
        info!("✅ Qdrant Collection '{}' Created.", name);
        Ok(())
    }
}

#[async_trait]
impl IdeaIndex for QdrantIdeaIndex {
    fn backend_name(&self) -> &'static str {
        "qdrant"
    }

    async fn ensure_schema(&self, recreate: bool) -> Result<()> {
        for name in &self.collections {
            self.ensure_collection(name, recreate).await?;
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, record: &IdeaRecord, vector: Vec<f32>) -> Result<Uuid> {
        let id = point_id(collection, record.post_id);
        let payload: Payload = serde_json::to_value(record)?.try_into()?;

        let point = PointStruct::new(id.to_string(), vector, payload);
        self.qdrant.upsert_points(UpsertPoints {
            collection_name: collection.into(),
            points: vec![point],
            wait: Some(true),
            ..Default::default()
        }).await?;
        Ok(id)
    }

    async fn get(&self, collection: &str, post_id: i64) -> Result<Option<IdeaRecord>> {
        let id = point_id(collection, post_id);
        let resp = self.qdrant.get_points(GetPoints {
            collection_name: collection.into(),
            ids: vec![id.to_string().into()],
            with_payload: Some(true.into()),
            ..Default::default()
        }).await?;

        match resp.result.into_iter().next() {
            Some(point) => Ok(Some(record_from_payload(point.payload)?)),
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
        let filter = group.map(|g| Filter {
            must: vec![Condition::matches("group_name", g.to_string())],
            ..Default::default()
        });

        let found = self.qdrant.search_points(SearchPoints {
            collection_name: collection.into(),
            vector,
            filter,
            limit: limit as u64,
            with_payload: Some(true.into()),
            ..Default::default()
        }).await?;

        let mut ideas = Vec::with_capacity(found.result.len());
        for point in found.result {
            match record_from_payload(point.payload) {
                Ok(record) => ideas.push(ScoredIdea { record, score: point.score }),
                Err(e) => warn!("Skipping unreadable point in '{}': {}", collection, e),
            }
        }
        Ok(ideas)
    }
}

fn record_from_payload(payload: HashMap<String, QdrantValue>) -> Result<IdeaRecord> {
    let fields: Map<String, Value> = payload.into_iter().map(|(k, v)| (k, to_json(v))).collect();
    serde_json::from_value(Value::Object(fields)).map_err(|e| anyhow!("payload is not an idea record: {}", e))
}

fn to_json(value: QdrantValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(list.values.into_iter().map(to_json).collect()),
        Some(Kind::StructValue(st)) => {
            Value::Object(st.fields.into_iter().map(|(k, v)| (k, to_json(v))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_deterministic_per_collection() {
        assert_eq!(point_id("posts", 17), point_id("posts", 17));
        assert_ne!(point_id("posts", 17), point_id("posts_is", 17));
        assert_ne!(point_id("posts", 17), point_id("posts", 18));
        assert_eq!(point_id("posts", 17), Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"posts17"));
    }

    #[test]
    fn payload_round_trips_through_qdrant_values() {
        let mut record = IdeaRecord { post_id: 9, name: "Torg".into(), group_name: "Miðborg".into(), ..Default::default() };
        record.summaries.short_summary = Some("Nýtt torg".into());
        record.drafts.one_word = Some("Torg".into());

        let payload: Payload = serde_json::to_value(&record).unwrap().try_into().unwrap();
        let map: HashMap<String, QdrantValue> = payload.into();
        let back = record_from_payload(map).unwrap();
        assert_eq!(back, record);
    }
}
