use qdrant_client::qdrant::FieldType;
use serde_json::Value;

use crate::modules::ideas::structs::IdeaRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Keyword,
    Text,
    Datetime,
}

/// One stored field of an idea record.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Contributes to the embedded text.
    pub vectorize: bool,
    /// Gets a payload index and may be used in search filters.
    pub filterable: bool,
}

const fn field(name: &'static str, kind: FieldKind, vectorize: bool, filterable: bool) -> FieldSpec {
    FieldSpec { name, kind, vectorize, filterable }
}

/// Stored fields; vectorized ones are embedded in this order.
pub const IDEA_FIELDS: &[FieldSpec] = &[
    field("post_id", FieldKind::Integer, false, true),
    field("group_id", FieldKind::Integer, false, true),
    field("community_id", FieldKind::Integer, false, false),
    field("domain_id", FieldKind::Integer, false, false),
    field("cluster_id", FieldKind::Integer, false, false),
    field("language", FieldKind::Keyword, false, true),
    field("status", FieldKind::Keyword, false, true),
    field("official_status", FieldKind::Keyword, false, false),
    field("group_name", FieldKind::Keyword, true, true),
    field("name", FieldKind::Text, true, false),
    field("description", FieldKind::Text, true, false),
    field("short_name", FieldKind::Text, true, false),
    field("short_summary", FieldKind::Text, true, false),
    field("full_summary", FieldKind::Text, true, false),
    field("short_summary_with_points", FieldKind::Text, true, false),
    field("full_summary_with_points", FieldKind::Text, true, false),
    field("emoji_summary", FieldKind::Text, true, false),
    field("one_word_summary", FieldKind::Text, true, false),
    field("image_url", FieldKind::Keyword, false, false),
    field("counter_endorsements_up", FieldKind::Integer, false, false),
    field("counter_endorsements_down", FieldKind::Integer, false, false),
    field("counter_points_for", FieldKind::Integer, false, false),
    field("counter_points_against", FieldKind::Integer, false, false),
    field("created_at", FieldKind::Datetime, false, false),
    field("updated_at", FieldKind::Datetime, false, false),
    field("content_hash", FieldKind::Keyword, false, false),
];

/// Payload index type for a filterable field, if Qdrant should index it.
pub fn qdrant_field_type(kind: FieldKind) -> Option<FieldType> {
    match kind {
        FieldKind::Integer => Some(FieldType::Integer),
        FieldKind::Keyword => Some(FieldType::Keyword),
        FieldKind::Text => Some(FieldType::Text),
        FieldKind::Datetime => None,
    }
}

/// Text handed to the embedding model: vectorized, non-empty fields joined by blank lines.
pub fn embedding_text(record: &IdeaRecord) -> String {
    let payload = serde_json::to_value(record).unwrap_or(Value::Null);
    IDEA_FIELDS
        .iter()
        .filter(|f| f.vectorize)
        .filter_map(|f| payload.get(f.name).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
