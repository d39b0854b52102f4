use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// An idea as submitted to the upsert endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Post {
    pub post_id: i64,
    pub name: String,
    pub description: String,
    pub language: String,
    pub group_name: String,
    pub image_url: String,
    pub long_lat: Vec<f64>,
    pub counter_endorsements_up: i64,
    pub counter_endorsements_down: i64,
    pub counter_points_for: i64,
    pub counter_points_against: i64,
    pub points_for: Vec<String>,
    pub points_against: Vec<String>,
    pub total_number_of_posts: i64,
    pub group_id: i64,
    pub community_id: i64,
    pub domain_id: i64,
    #[serde(alias = "cluser_id")]
    pub cluster_id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub status: String,
    pub official_status: String,
}

impl Post {
    pub fn has_points_for(&self) -> bool {
        self.points_for.iter().any(|p| !p.trim().is_empty())
    }

    pub fn has_points_against(&self) -> bool {
        self.points_against.iter().any(|p| !p.trim().is_empty())
    }
}

/// Raw model outputs, kept so an unchanged idea can be re-rendered without new calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryDrafts {
    pub short_name: Option<String>,
    pub short_summary: Option<String>,
    pub full_summary: Option<String>,
    pub short_points_for: Option<String>,
    pub short_points_against: Option<String>,
    pub full_points_for: Option<String>,
    pub full_points_against: Option<String>,
    pub emoji: Option<String>,
    pub one_word: Option<String>,
}

/// Rendered summary documents, one per retrieval view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summaries {
    pub short_name: Option<String>,
    pub short_summary: Option<String>,
    pub full_summary: Option<String>,
    pub short_summary_with_points: Option<String>,
    pub full_summary_with_points: Option<String>,
    pub emoji_summary: Option<String>,
    pub one_word_summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryField {
    ShortName,
    ShortSummary,
    FullSummary,
    ShortSummaryWithPoints,
    FullSummaryWithPoints,
    EmojiSummary,
    OneWordSummary,
}

impl SummaryField {
    pub const ALL: [SummaryField; 7] = [
        SummaryField::ShortName,
        SummaryField::ShortSummary,
        SummaryField::FullSummary,
        SummaryField::ShortSummaryWithPoints,
        SummaryField::FullSummaryWithPoints,
        SummaryField::EmojiSummary,
        SummaryField::OneWordSummary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryField::ShortName => "short_name",
            SummaryField::ShortSummary => "short_summary",
            SummaryField::FullSummary => "full_summary",
            SummaryField::ShortSummaryWithPoints => "short_summary_with_points",
            SummaryField::FullSummaryWithPoints => "full_summary_with_points",
            SummaryField::EmojiSummary => "emoji_summary",
            SummaryField::OneWordSummary => "one_word_summary",
        }
    }
}

impl Summaries {
    pub fn get(&self, field: SummaryField) -> Option<&str> {
        let value = match field {
            SummaryField::ShortName => &self.short_name,
            SummaryField::ShortSummary => &self.short_summary,
            SummaryField::FullSummary => &self.full_summary,
            SummaryField::ShortSummaryWithPoints => &self.short_summary_with_points,
            SummaryField::FullSummaryWithPoints => &self.full_summary_with_points,
            SummaryField::EmojiSummary => &self.emoji_summary,
            SummaryField::OneWordSummary => &self.one_word_summary,
        };
        value.as_deref()
    }

    pub fn missing(&self) -> Vec<SummaryField> {
        SummaryField::ALL.iter().copied().filter(|f| self.get(*f).is_none()).collect()
    }
}

/// What the vector index stores for one idea.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeaRecord {
    pub post_id: i64,
    pub name: String,
    pub description: String,
    pub language: String,
    pub group_name: String,
    pub image_url: String,
    pub counter_endorsements_up: i64,
    pub counter_endorsements_down: i64,
    pub counter_points_for: i64,
    pub counter_points_against: i64,
    pub group_id: i64,
    pub community_id: i64,
    pub domain_id: i64,
    pub cluster_id: i64,
    pub status: String,
    pub official_status: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(flatten)]
    pub summaries: Summaries,
    pub drafts: SummaryDrafts,
    pub content_hash: String,
    pub indexed_at: Option<DateTime<Utc>>,
}

impl IdeaRecord {
    /// Copies the post's own fields; summaries are filled in by the ingestor.
    pub fn from_post(post: &Post) -> Self {
        Self {
            post_id: post.post_id,
            name: post.name.clone(),
            description: post.description.clone(),
            language: post.language.clone(),
            group_name: post.group_name.clone(),
            image_url: post.image_url.clone(),
            counter_endorsements_up: post.counter_endorsements_up,
            counter_endorsements_down: post.counter_endorsements_down,
            counter_points_for: post.counter_points_for,
            counter_points_against: post.counter_points_against,
            group_id: post.group_id,
            community_id: post.community_id,
            domain_id: post.domain_id,
            cluster_id: post.cluster_id,
            status: post.status.clone(),
            official_status: post.official_status.clone(),
            created_at: post.created_at.clone(),
            updated_at: post.updated_at.clone(),
            ..Default::default()
        }
    }

    /// Retrieval text for `view`, falling back to the raw name and description.
    pub fn document(&self, view: SummaryField) -> String {
        match self.summaries.get(view) {
            Some(text) => text.to_string(),
            None => format!(
                "Idea: {}\n{}\n\n Neighborhood: {}\n\n Source: {}",
                self.name, self.description, self.group_name, self.post_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_accepts_legacy_cluster_key_and_missing_fields() {
        let post: Post = serde_json::from_str(
            r#"{"post_id": 7, "name": "Bekkur", "cluser_id": 3, "points_for": ["Gott"]}"#,
        )
        .unwrap();
        assert_eq!(post.cluster_id, 3);
        assert!(post.has_points_for());
        assert!(!post.has_points_against());
        assert_eq!(post.language, "");
    }

    #[test]
    fn record_payload_is_flat_for_summaries() {
        let mut record = IdeaRecord::from_post(&Post { post_id: 1, ..Default::default() });
        record.summaries.short_summary = Some("Stutt".into());
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["short_summary"], "Stutt");
        assert!(v["full_summary"].is_null());
        assert!(v["drafts"].is_object());

        let back: IdeaRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn document_falls_back_to_source_text() {
        let record = IdeaRecord::from_post(&Post {
            post_id: 42,
            name: "Hundagerði".into(),
            description: "Girt svæði".into(),
            group_name: "Laugardalur".into(),
            ..Default::default()
        });
        let doc = record.document(SummaryField::ShortSummary);
        assert!(doc.contains("Hundagerði"));
        assert!(doc.contains("Source: 42"));
        assert_eq!(record.summaries.missing().len(), 7);
    }
}
