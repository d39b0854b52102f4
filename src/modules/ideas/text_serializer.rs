use std::fmt;
use sha2::{Digest, Sha256};

use super::structs::{Post, Summaries, SummaryDrafts};

/// Short-name document.
pub struct NameDocument<'a> {
    pub name: &'a str,
    pub post: &'a Post,
}

impl fmt::Display for NameDocument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,
            "Idea: {}\n\n Neighborhood: {}\n\n Source: {}\n\n",
            self.name, self.post.group_name, self.post.post_id
        )
    }
}

/// Short or full summary without points.
pub struct SummaryDocument<'a> {
    pub summary: &'a str,
    pub post: &'a Post,
}

impl fmt::Display for SummaryDocument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,
            "Idea: {}\n\n Neighborhood: {}\n\n Source: {}",
            self.summary, self.post.group_name, self.post.post_id
        )
    }
}

/// Summary with points for and against, image and vote counts.
pub struct PointsDocument<'a> {
    pub summary: &'a str,
    pub points_for: &'a str,
    pub points_against: &'a str,
    pub post: &'a Post,
}

impl fmt::Display for PointsDocument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,
            "Idea: {}\n\n Neighborhood: {}\n\n Points for: {}\n\n Points against: {}\n\n Source: {}\n\n \
            <image_url={}>\n <likes={}>\n <dislikes={}>\n\n",
            self.summary, self.post.group_name, self.points_for, self.points_against, self.post.post_id,
            self.post.image_url, self.post.counter_endorsements_up, self.post.counter_endorsements_down
        )
    }
}

/// Name and description, the input to the summary prompts.
pub fn source_text(post: &Post) -> String {
    format!("{}\n{}", post.name, post.description)
}

pub fn points_text(post: &Post, points: &[String]) -> String {
    format!("{}\n{}", post.name, points.join("\n"))
}

/// SHA-256 (hex) over everything the summarizer reads.
pub fn content_hash(post: &Post) -> String {
    let mut hasher = Sha256::new();
    hasher.update(post.name.as_bytes());
    hasher.update([0u8]);
    hasher.update(post.description.as_bytes());
    for p in &post.points_for {
        hasher.update([1u8]);
        hasher.update(p.as_bytes());
    }
    for p in &post.points_against {
        hasher.update([2u8]);
        hasher.update(p.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Renders the stored documents from drafts and the post's current counters.
///
/// A document is left unset when its main draft is missing, or when the post
/// has points on a side whose draft is missing.
pub fn render_summaries(post: &Post, drafts: &SummaryDrafts) -> Summaries {
    let with_points = |summary: &Option<String>, pro: &Option<String>, con: &Option<String>| {
        if (post.has_points_for() && pro.is_none()) || (post.has_points_against() && con.is_none()) {
            return None;
        }
        summary.as_deref().map(|s| {
            PointsDocument {
                summary: s,
                points_for: pro.as_deref().unwrap_or(""),
                points_against: con.as_deref().unwrap_or(""),
                post,
            }
            .to_string()
        })
    };

    Summaries {
        short_name: drafts.short_name.as_deref().map(|n| NameDocument { name: n, post }.to_string()),
        short_summary: drafts.short_summary.as_deref().map(|s| SummaryDocument { summary: s, post }.to_string()),
        full_summary: drafts.full_summary.as_deref().map(|s| SummaryDocument { summary: s, post }.to_string()),
        short_summary_with_points: with_points(&drafts.short_summary, &drafts.short_points_for, &drafts.short_points_against),
        full_summary_with_points: with_points(&drafts.full_summary, &drafts.full_points_for, &drafts.full_points_against),
        emoji_summary: drafts.emoji.clone(),
        one_word_summary: drafts.one_word.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> Post {
        Post {
            post_id: 1234,
            name: "Leiktæki".into(),
            description: "Ný leiktæki á skólalóð".into(),
            group_name: "Vesturbær".into(),
            image_url: "https://img/1.png".into(),
            counter_endorsements_up: 17,
            counter_endorsements_down: 2,
            points_for: vec!["Börnin njóta".into()],
            ..Default::default()
        }
    }

    #[test]
    fn points_document_carries_metadata() {
        let p = post();
        let doc = PointsDocument { summary: "Leiktæki", points_for: "Gaman", points_against: "", post: &p }.to_string();
        assert!(doc.starts_with("Idea: Leiktæki"));
        assert!(doc.contains("Neighborhood: Vesturbær"));
        assert!(doc.contains("Points for: Gaman"));
        assert!(doc.contains("Source: 1234"));
        assert!(doc.contains("<image_url=https://img/1.png>"));
        assert!(doc.contains("<likes=17>"));
        assert!(doc.contains("<dislikes=2>"));
    }

    #[test]
    fn hash_tracks_summarized_text_only() {
        let a = post();
        let mut b = post();
        b.counter_endorsements_up = 99;
        b.status = "published".into();
        assert_eq!(content_hash(&a), content_hash(&b));

        b.points_against.push("Dýrt".into());
        assert_ne!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn render_skips_documents_without_drafts() {
        let p = post();
        let drafts = SummaryDrafts {
            short_summary: Some("Stutt".into()),
            short_points_for: Some("Gaman".into()),
            ..Default::default()
        };
        let s = render_summaries(&p, &drafts);
        assert!(s.short_summary.as_deref().unwrap().contains("Idea: Stutt"));
        assert!(s.short_summary_with_points.as_deref().unwrap().contains("Points for: Gaman"));
        assert!(s.full_summary.is_none());
        assert!(s.full_summary_with_points.is_none());
        assert!(s.short_name.is_none());
    }

    #[test]
    fn points_document_needs_drafts_for_every_side_with_points() {
        let mut p = post();
        p.points_against = vec!["Dýrt".into()];
        let drafts = SummaryDrafts {
            short_summary: Some("Stutt".into()),
            short_points_for: Some("Gaman".into()),
            ..Default::default()
        };
        let s = render_summaries(&p, &drafts);
        assert!(s.short_summary.is_some());
        assert!(s.short_summary_with_points.is_none());

        p.points_against.clear();
        p.points_for.clear();
        let s = render_summaries(&p, &SummaryDrafts { short_summary: Some("Stutt".into()), ..Default::default() });
        assert!(s.short_summary_with_points.as_deref().unwrap().contains("Idea: Stutt"));
    }
}
