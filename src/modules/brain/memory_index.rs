use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::config::DistanceMetric;
use crate::modules::ideas::structs::IdeaRecord;
use super::rag::{point_id, IdeaIndex, ScoredIdea};

struct StoredIdea {
    collection: String,
    record: IdeaRecord,
    vector: Vec<f32>,
}

/// In-process index with brute-force scoring. Nothing survives a restart.
pub struct MemoryIdeaIndex {
    points: DashMap<Uuid, StoredIdea>,
    distance: DistanceMetric,
}

impl MemoryIdeaIndex {
    pub fn new(distance: DistanceMetric) -> Self {
        Self { points: DashMap::new(), distance }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return f32::MIN;
        }
        match self.distance {
            DistanceMetric::Cosine => cosine_sim(a, b),
            DistanceMetric::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            DistanceMetric::Euclid => -a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt(),
        }
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl IdeaIndex for MemoryIdeaIndex {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ensure_schema(&self, recreate: bool) -> Result<()> {
        if recreate {
            info!("🗑️ Clearing in-memory index ({} points)", self.points.len());
            self.points.clear();
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, record: &IdeaRecord, vector: Vec<f32>) -> Result<Uuid> {
        let id = point_id(collection, record.post_id);
        self.points.insert(id, StoredIdea {
            collection: collection.to_string(),
            record: record.clone(),
            vector,
        });
        Ok(id)
    }

    async fn get(&self, collection: &str, post_id: i64) -> Result<Option<IdeaRecord>> {
        Ok(self.points.get(&point_id(collection, post_id)).map(|p| p.record.clone()))
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        group: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredIdea>> {
        let mut scored: Vec<ScoredIdea> = self.points
            .iter()
            .filter(|p| p.collection == collection)
            .filter(|p| group.map_or(true, |g| p.record.group_name == g))
            .map(|p| ScoredIdea { record: p.record.clone(), score: self.score(&vector, &p.vector) })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}
