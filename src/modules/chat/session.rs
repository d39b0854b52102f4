use std::sync::Arc;
use anyhow::{Result, Context};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::settings::{MemoryConfig, Settings};
use crate::modules::brain::analysis::{ConversationContext, QuestionAnalysis, QuestionAnalyzer, QuestionIntent};
use crate::modules::brain::llm::{ChatMessage, CompletionRequest, LanguageModel};
use crate::modules::brain::prompts::PromptBook;
use crate::modules::brain::IdeaIndex;
use super::followups::stream_followups;
use super::memory::{ChatMemory, MemoryCompactor};
use super::protocol::{ChatResponse, Disconnected, MessageKind, Outbox};

pub const GENERIC_ERROR: &str = "Sorry, something went wrong. Try again.";

/// Shared, read-only half of the chat pipeline.
pub struct ChatEngine {
    llm: Arc<dyn LanguageModel>,
    index: Arc<dyn IdeaIndex>,
    analyzer: QuestionAnalyzer,
    compactor: MemoryCompactor,
    prompts: Arc<PromptBook>,
    collection: String,
    chat_model: String,
    answer_max_tokens: u32,
    followup_max_tokens: u32,
    temperature: f32,
    memory: MemoryConfig,
}

impl ChatEngine {
    pub fn new(llm: Arc<dyn LanguageModel>, index: Arc<dyn IdeaIndex>, prompts: Arc<PromptBook>, settings: &Settings) -> Self {
        Self {
            analyzer: QuestionAnalyzer::new(llm.clone(), prompts.clone(), &settings.llm, settings.retrieval.clone()),
            compactor: MemoryCompactor::new(llm.clone(), &settings.llm, &settings.project.chat_language),
            collection: settings.index.collection_for(&settings.retrieval.language).to_string(),
            chat_model: settings.llm.chat_model.clone(),
            answer_max_tokens: settings.llm.answer_max_tokens,
            followup_max_tokens: settings.llm.followup_max_tokens,
            temperature: settings.llm.temperature,
            memory: settings.memory.clone(),
            llm,
            index,
            prompts,
        }
    }

    pub fn open_session(self: &Arc<Self>, id: Uuid, outbox: Outbox) -> ChatSession {
        ChatSession {
            id,
            engine: self.clone(),
            outbox,
            memory: ChatMemory::new(self.memory.clone()),
            context: ConversationContext::default(),
        }
    }

    /// Embeds the query and renders the hits in the plan's view.
    async fn retrieve(&self, question: &str, analysis: &QuestionAnalysis) -> Result<(String, usize)> {
        let vector = self.llm.embed(&analysis.query_text(question)).await.context("embedding question")?;
        let hits = self.index
            .search(&self.collection, vector, analysis.group_name.as_deref(), analysis.plan.top_k)
            .await
            .context("searching ideas")?;

        let documents: Vec<String> = hits.iter().map(|h| h.record.document(analysis.plan.view)).collect();
        Ok((documents.join("\n\n"), documents.len()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Answered { answer: String, documents: usize },
    Moderated,
}

/// One connected client: its memory and carried context.
pub struct ChatSession {
    id: Uuid,
    engine: Arc<ChatEngine>,
    outbox: Outbox,
    memory: ChatMemory,
    context: ConversationContext,
}

impl ChatSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn memory(&self) -> &ChatMemory {
        &self.memory
    }

    /// Runs one turn. Errors other than a disconnect are logged and reported
    /// to the client, and the session carries on.
    pub async fn run_turn(&mut self, question: &str) -> Result<(), Disconnected> {
        match self.handle_question(question).await {
            Ok(_) => Ok(()),
            Err(e) if e.downcast_ref::<Disconnected>().is_some() => Err(Disconnected),
            Err(e) => {
                error!(session_id = %self.id, "❌ Turn failed: {:#}", e);
                self.outbox.bot(MessageKind::Error, GENERIC_ERROR).await
            }
        }
    }

    pub async fn handle_question(&mut self, question: &str) -> Result<TurnOutcome> {
        let engine = self.engine.clone();
        self.outbox.send(ChatResponse::you(question)).await?;
        self.outbox.bot(MessageKind::Thinking, "").await?;

        if engine.llm.moderate(question).await? {
            warn!(session_id = %self.id, "🚫 Question flagged by moderation");
            self.outbox.bot(MessageKind::ModerationError, "").await?;
            return Ok(TurnOutcome::Moderated);
        }

        let analysis = engine.analyzer.analyze(question, &mut self.context).await?;
        let (context, documents) = engine.retrieve(question, &analysis).await?;
        info!(session_id = %self.id, intent = ?analysis.intent, documents, "📚 Context retrieved");

        let messages = if analysis.intent == QuestionIntent::AskingAboutProjectRules {
            engine.prompts.about_project_messages(question, &context)
        } else {
            let mut m = self.memory.render(&engine.prompts.system_prompt(&context));
            m.push(ChatMessage::user(question));
            m
        };

        let request = CompletionRequest::new(&engine.chat_model, messages)
            .temperature(engine.temperature)
            .max_tokens(engine.answer_max_tokens);

        self.outbox.bot(MessageKind::Start, "").await?;
        let mut rx = engine.llm.stream(&request).await?;
        let mut answer = String::new();
        while let Some(delta) = rx.recv().await {
            let delta = delta?;
            answer.push_str(&delta);
            self.outbox.bot(MessageKind::Stream, delta).await?;
        }
        self.outbox.bot(MessageKind::End, "").await?;

        self.memory.save_turn(question, &answer);

        let (followups, stats) = tokio::join!(
            stream_followups(
                engine.llm.as_ref(),
                &engine.chat_model,
                engine.followup_max_tokens,
                &engine.prompts.project().name,
                question,
                &answer,
                &self.outbox,
            ),
            self.memory.compact(&engine.compactor),
        );
        if stats.failed {
            warn!(session_id = %self.id, "⚠️ Memory compaction incomplete");
        }
        followups?;

        Ok(TurnOutcome::Answered { answer, documents })
    }
}
