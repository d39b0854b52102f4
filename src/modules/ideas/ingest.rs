use std::sync::Arc;
use anyhow::{Result, Context};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::settings::IndexConfig;
use crate::database::schema::embedding_text;
use crate::modules::brain::{IdeaIndex, LanguageModel};
use super::structs::{IdeaRecord, Post};
use super::summarizer::{drafts_complete, Summarizer};
use super::text_serializer::{content_hash, render_summaries};

/// Outcome of one upsert, returned to the caller as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub post_id: i64,
    pub point_id: Uuid,
    pub collection: String,
    /// Summaries were taken from the stored record instead of regenerated.
    pub reused_summaries: bool,
    /// Summaries that failed and were left unset.
    pub missing_fields: Vec<String>,
}

/// Summarizes, embeds and stores ideas.
pub struct IdeaIngestor {
    llm: Arc<dyn LanguageModel>,
    index: Arc<dyn IdeaIndex>,
    summarizer: Summarizer,
    index_config: IndexConfig,
}

impl IdeaIngestor {
    pub fn new(llm: Arc<dyn LanguageModel>, index: Arc<dyn IdeaIndex>, summarizer: Summarizer, index_config: IndexConfig) -> Self {
        Self { llm, index, summarizer, index_config }
    }

    pub async fn upsert(&self, post: &Post) -> Result<IngestReport> {
        let collection = self.index_config.collection_for(&post.language).to_string();
        let hash = content_hash(post);

        let existing = self.index.get(&collection, post.post_id).await
            .with_context(|| format!("reading post {} from {}", post.post_id, collection))?;

        let (drafts, reused) = match existing {
            Some(prev) if prev.content_hash == hash && drafts_complete(post, &prev.drafts) => {
                info!(post_id = post.post_id, "♻️ Text unchanged, reusing stored summaries");
                (prev.drafts, true)
            }
            _ => {
                let outcome = self.summarizer.summarize(post).await;
                if !outcome.failed.is_empty() {
                    warn!(post_id = post.post_id, failed = ?outcome.failed, "⚠️ Summary tasks failed");
                }
                (outcome.drafts, false)
            }
        };

        let mut record = IdeaRecord::from_post(post);
        record.summaries = render_summaries(post, &drafts);
        record.drafts = drafts;
        record.content_hash = hash;
        record.indexed_at = Some(Utc::now());

        let vector = self.llm.embed(&embedding_text(&record)).await
            .with_context(|| format!("embedding post {}", post.post_id))?;
        let point_id = self.index.upsert(&collection, &record, vector).await
            .with_context(|| format!("writing post {} to {}", post.post_id, collection))?;

        let missing: Vec<String> = record.summaries.missing().iter().map(|f| f.as_str().to_string()).collect();
        if !missing.is_empty() {
            warn!(post_id = post.post_id, ?missing, "⚠️ Stored with missing summaries");
        }
        info!(post_id = post.post_id, %point_id, collection = %collection, reused, "✅ Idea indexed");

        Ok(IngestReport {
            post_id: post.post_id,
            point_id,
            collection,
            reused_summaries: reused,
            missing_fields: missing,
        })
    }

    /// Looks the idea up in the collection its language routes to.
    pub async fn lookup(&self, post_id: i64, language: &str) -> Result<Option<IdeaRecord>> {
        let collection = self.index_config.collection_for(language);
        self.index.get(collection, post_id).await
            .with_context(|| format!("reading post {} from {}", post_id, collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::LlmConfig;
    use crate::config::DistanceMetric;
    use crate::modules::brain::testing::ScriptedModel;
    use crate::modules::brain::MemoryIdeaIndex;

    fn post() -> Post {
        Post {
            post_id: 321,
            name: "Hundagerði í Laugardal".into(),
            description: "Afgirt svæði fyrir hunda".into(),
            language: "is".into(),
            group_name: "Laugardalur".into(),
            counter_endorsements_up: 10,
            points_for: vec!["Hundar fá hreyfingu".into()],
            points_against: vec!["Hávaði".into()],
            ..Default::default()
        }
    }

    fn ingestor(model: Arc<ScriptedModel>, index: Arc<MemoryIdeaIndex>) -> IdeaIngestor {
        let summarizer = Summarizer::new(model.clone(), &LlmConfig::default());
        IdeaIngestor::new(model, index, summarizer, IndexConfig::default())
    }

    #[tokio::test]
    async fn first_upsert_summarizes_and_routes_by_language() {
        let model = Arc::new(ScriptedModel::echo_prefix("S: "));
        let index = Arc::new(MemoryIdeaIndex::new(DistanceMetric::Cosine));
        let ingestor = ingestor(model.clone(), index.clone());

        let report = ingestor.upsert(&post()).await.unwrap();
        assert_eq!(report.collection, "posts_is");
        assert!(!report.reused_summaries);
        assert!(report.missing_fields.is_empty());
        assert_eq!(model.completion_count(), 9);

        let stored = ingestor.lookup(321, "is").await.unwrap().unwrap();
        assert!(stored.summaries.missing().is_empty());
        assert!(stored.summaries.full_summary_with_points.as_deref().unwrap().contains("<likes=10>"));
        assert!(ingestor.lookup(321, "en").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unchanged_text_reuses_summaries_and_refreshes_counters() {
        let model = Arc::new(ScriptedModel::echo_prefix("S: "));
        let index = Arc::new(MemoryIdeaIndex::new(DistanceMetric::Cosine));
        let ingestor = ingestor(model.clone(), index.clone());

        ingestor.upsert(&post()).await.unwrap();
        let mut voted = post();
        voted.counter_endorsements_up = 25;
        let report = ingestor.upsert(&voted).await.unwrap();

        assert!(report.reused_summaries);
        assert_eq!(model.completion_count(), 9);
        let stored = ingestor.lookup(321, "is").await.unwrap().unwrap();
        assert!(stored.summaries.short_summary_with_points.as_deref().unwrap().contains("<likes=25>"));
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn changed_text_or_failed_summary_triggers_new_pass() {
        let model = Arc::new(ScriptedModel::echo_prefix("S: ").fail_when_prompt_contains("emojis"));
        let index = Arc::new(MemoryIdeaIndex::new(DistanceMetric::Cosine));
        let ingestor = ingestor(model.clone(), index.clone());

        let report = ingestor.upsert(&post()).await.unwrap();
        assert_eq!(report.missing_fields, vec!["emoji_summary".to_string()]);
        let stored = ingestor.lookup(321, "is").await.unwrap().unwrap();
        assert!(stored.summaries.emoji_summary.is_none());
        assert!(stored.summaries.short_summary.is_some());

        // incomplete drafts are never reused
        let again = ingestor.upsert(&post()).await.unwrap();
        assert!(!again.reused_summaries);
        assert_eq!(model.completion_count(), 18);
    }

    #[tokio::test]
    async fn failed_points_draft_leaves_points_documents_unset() {
        let model = Arc::new(ScriptedModel::echo_prefix("S: ").fail_when_prompt_contains("points for below"));
        let index = Arc::new(MemoryIdeaIndex::new(DistanceMetric::Cosine));
        let ingestor = ingestor(model, index);

        let report = ingestor.upsert(&post()).await.unwrap();
        assert_eq!(report.missing_fields, vec!["short_summary_with_points".to_string()]);

        let stored = ingestor.lookup(321, "is").await.unwrap().unwrap();
        assert!(stored.summaries.short_summary_with_points.is_none());
        assert!(stored.summaries.full_summary_with_points.is_some());
        assert!(stored.summaries.short_summary.is_some());
    }
}
