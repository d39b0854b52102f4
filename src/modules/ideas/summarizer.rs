use std::sync::Arc;
use anyhow::Result;
use tracing::{info, warn};

use crate::config::settings::LlmConfig;
use crate::modules::brain::llm::{ChatMessage, CompletionRequest, LanguageModel};
use super::structs::{Post, SummaryDrafts};
use super::text_serializer::{points_text, source_text};

const SYSTEM_MESSAGE: &str = "You are an effective text summarization and shortening system.\n\
If you can't shorten text just output the original text.\n\
Always output text without an explaination.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryTask {
    ShortName,
    ShortSummary,
    FullSummary,
    ShortPointsFor,
    ShortPointsAgainst,
    FullPointsFor,
    FullPointsAgainst,
    Emoji,
    OneWord,
}

impl SummaryTask {
    pub fn name(&self) -> &'static str {
        match self {
            SummaryTask::ShortName => "short_name",
            SummaryTask::ShortSummary => "short_summary",
            SummaryTask::FullSummary => "full_summary",
            SummaryTask::ShortPointsFor => "short_points_for",
            SummaryTask::ShortPointsAgainst => "short_points_against",
            SummaryTask::FullPointsFor => "full_points_for",
            SummaryTask::FullPointsAgainst => "full_points_against",
            SummaryTask::Emoji => "emoji",
            SummaryTask::OneWord => "one_word",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            SummaryTask::ShortName => "Please shorten the idea name as much as possible without using abbreviations.\n\n",
            SummaryTask::ShortSummary => "Please summarize the text below as much as possible without using abbreviations \
                in one short paragraph. Please keep it as short as possible.\n\n",
            SummaryTask::FullSummary => "Please summarize the text below in detail and leave no part of the concept out.\n\n",
            SummaryTask::ShortPointsFor => "Please summarize the points for below as much as possible without using \
                abbreviations in one short paragraph. Please keep it very short, only a few sentences.\n\n",
            SummaryTask::ShortPointsAgainst => "Please summarize the points against below as much as possible without \
                using abbreviations in one short paragraph. Please keep it very short, only a few sentences.\n\n",
            SummaryTask::FullPointsFor => "Please summarize the points for the idea below in full detail, in one to \
                three paragraphs, and leave nothing out. All opinions in the points below must be included in this summary.\n\n",
            SummaryTask::FullPointsAgainst => "Please summarize the points against the idea below in full detail, in one \
                to three paragraphs, and leave nothing out. All opinions in the points below must be included in this summary.\n\n",
            SummaryTask::Emoji => "Please summarize the idea below with at most five emojis and nothing else.\n\n",
            SummaryTask::OneWord => "Please summarize the idea below in a single word.\n\n",
        }
    }
}

/// Result of one summarization pass.
#[derive(Debug, Default)]
pub struct SummaryOutcome {
    pub drafts: SummaryDrafts,
    /// Tasks that were requested and failed.
    pub failed: Vec<&'static str>,
}

pub struct Summarizer {
    llm: Arc<dyn LanguageModel>,
    model: String,
    temperature: f32,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LanguageModel>, config: &LlmConfig) -> Self {
        Self {
            llm,
            model: config.fast_model.clone(),
            temperature: config.summary_temperature,
        }
    }

    async fn summarize_text(&self, task: SummaryTask, text: &str) -> Result<String> {
        let request = CompletionRequest::new(&self.model, vec![
            ChatMessage::system(SYSTEM_MESSAGE),
            ChatMessage::user(format!("{}{}", task.prefix(), text)),
        ])
        .temperature(self.temperature);

        self.llm.complete(&request).await
    }

    /// `None` input means the task does not apply; nothing is requested.
    async fn run(&self, task: SummaryTask, text: Option<&str>) -> (SummaryTask, Option<Result<String>>) {
        match text {
            Some(t) => (task, Some(self.summarize_text(task, t).await)),
            None => (task, None),
        }
    }

    /// Runs every applicable summary concurrently. A failed call leaves its draft unset.
    pub async fn summarize(&self, post: &Post) -> SummaryOutcome {
        let id = post.post_id;
        let text = source_text(post);
        let pro = post.has_points_for().then(|| points_text(post, &post.points_for));
        let con = post.has_points_against().then(|| points_text(post, &post.points_against));

        info!("📝 [Summarizer] post {} (points for: {}, against: {})", id, pro.is_some(), con.is_some());

        let results = [
            self.run(SummaryTask::ShortName, Some(&post.name)),
            self.run(SummaryTask::ShortSummary, Some(&text)),
            self.run(SummaryTask::FullSummary, Some(&text)),
            self.run(SummaryTask::ShortPointsFor, pro.as_deref()),
            self.run(SummaryTask::ShortPointsAgainst, con.as_deref()),
            self.run(SummaryTask::FullPointsFor, pro.as_deref()),
            self.run(SummaryTask::FullPointsAgainst, con.as_deref()),
            self.run(SummaryTask::Emoji, Some(&text)),
            self.run(SummaryTask::OneWord, Some(&text)),
        ];
        let results = futures_util::future::join_all(results).await;

        let mut outcome = SummaryOutcome::default();
        for (task, result) in results {
            let value = match result {
                None => continue,
                Some(Ok(v)) => Some(v.trim().to_string()),
                Some(Err(e)) => {
                    warn!(post_id = id, task = task.name(), "⚠️ summary failed: {:#}", e);
                    outcome.failed.push(task.name());
                    None
                }
            };
            let d = &mut outcome.drafts;
            match task {
                SummaryTask::ShortName => d.short_name = value,
                SummaryTask::ShortSummary => d.short_summary = value,
                SummaryTask::FullSummary => d.full_summary = value,
                SummaryTask::ShortPointsFor => d.short_points_for = value,
                SummaryTask::ShortPointsAgainst => d.short_points_against = value,
                SummaryTask::FullPointsFor => d.full_points_for = value,
                SummaryTask::FullPointsAgainst => d.full_points_against = value,
                SummaryTask::Emoji => d.emoji = value,
                SummaryTask::OneWord => d.one_word = value,
            }
        }
        outcome
    }
}

/// Whether `drafts` hold every summary `post` calls for.
pub fn drafts_complete(post: &Post, drafts: &SummaryDrafts) -> bool {
    let base = drafts.short_name.is_some()
        && drafts.short_summary.is_some()
        && drafts.full_summary.is_some()
        && drafts.emoji.is_some()
        && drafts.one_word.is_some();
    let pro = !post.has_points_for() || (drafts.short_points_for.is_some() && drafts.full_points_for.is_some());
    let con = !post.has_points_against() || (drafts.short_points_against.is_some() && drafts.full_points_against.is_some());
    base && pro && con
}
