use std::collections::VecDeque;
use std::sync::Arc;
use anyhow::Result;
use tracing::{debug, warn};

use crate::config::settings::{LlmConfig, MemoryConfig};
use crate::modules::brain::llm::{ChatMessage, CompletionRequest, LanguageModel};
use crate::modules::brain::prompts::{digest_messages, memory_summary_messages};

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

/// Summarizes and folds chat messages with the fast model.
pub struct MemoryCompactor {
    llm: Arc<dyn LanguageModel>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    language: String,
}

impl MemoryCompactor {
    /// `language` is the language the summaries and digests are written in.
    pub fn new(llm: Arc<dyn LanguageModel>, config: &LlmConfig, language: &str) -> Self {
        Self {
            llm,
            language: language.to_string(),
            model: config.fast_model.clone(),
            max_tokens: config.memory_max_tokens,
            temperature: config.summary_temperature,
        }
    }

    async fn ask(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = CompletionRequest::new(&self.model, messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);
        Ok(self.llm.complete(&request).await?.trim().to_string())
    }

    pub async fn summarize(&self, history: &str, speaker: &str, message: &str) -> Result<String> {
        self.ask(memory_summary_messages(&self.language, history, speaker, message)).await
    }

    pub async fn fold(&self, digest: &str, speaker: &str, message: &str) -> Result<String> {
        self.ask(digest_messages(&self.language, digest, speaker, message)).await
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    pub summarized: usize,
    pub folded: usize,
    pub failed: bool,
}

/// Three-tier conversation memory: recent turns verbatim, older turns
/// summarized, oldest folded into one digest per speaker.
#[derive(Debug, Clone)]
pub struct ChatMemory {
    verbatim: VecDeque<Turn>,
    summarized: VecDeque<Turn>,
    user_digest: String,
    assistant_digest: String,
    config: MemoryConfig,
}

impl ChatMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            verbatim: VecDeque::new(),
            summarized: VecDeque::new(),
            user_digest: String::new(),
            assistant_digest: String::new(),
            config,
        }
    }

    /// Records an answered turn.
    pub fn save_turn(&mut self, user: &str, assistant: &str) {
        self.verbatim.push_back(Turn { user: user.to_string(), assistant: assistant.to_string() });
    }

    pub fn verbatim(&self) -> &VecDeque<Turn> {
        &self.verbatim
    }

    pub fn summarized(&self) -> &VecDeque<Turn> {
        &self.summarized
    }

    pub fn digests(&self) -> (&str, &str) {
        (&self.user_digest, &self.assistant_digest)
    }

    fn has_digest(&self) -> bool {
        !self.user_digest.is_empty() || !self.assistant_digest.is_empty()
    }

    /// Plain-text transcript used as context for summaries.
    pub fn history_text(&self) -> String {
        let mut out = String::new();
        if self.has_digest() {
            out.push_str(&format!("Earlier, user: {}\nEarlier, chatbot: {}\n", self.user_digest, self.assistant_digest));
        }
        for turn in self.summarized.iter().chain(self.verbatim.iter()) {
            out.push_str(&format!("User: {}\nChatbot: {}\n", turn.user, turn.assistant));
        }
        out
    }

    /// System prompt, digest note, summarized turns, verbatim turns.
    pub fn render(&self, system_prompt: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(system_prompt)];
        if self.has_digest() {
            messages.push(ChatMessage::system(format!(
                "Summary of the earlier conversation.\nThe user: {}\nThe assistant: {}",
                self.user_digest, self.assistant_digest
            )));
        }
        for turn in self.summarized.iter().chain(self.verbatim.iter()) {
            messages.push(ChatMessage::user(turn.user.clone()));
            messages.push(ChatMessage::assistant(turn.assistant.clone()));
        }
        messages
    }

    /// Moves overflowing turns one tier down, oldest first.
    ///
    /// A failed model call leaves the turn where it is and ends the pass.
    pub async fn compact(&mut self, compactor: &MemoryCompactor) -> CompactionStats {
        let mut stats = CompactionStats::default();

        while self.verbatim.len() > self.config.full_turns {
            let Some(turn) = self.verbatim.front().cloned() else { break };
            let history = self.history_text();
            let (user, assistant) = tokio::join!(
                compactor.summarize(&history, "user", &turn.user),
                compactor.summarize(&history, "chatbot", &turn.assistant),
            );
            match (user, assistant) {
                (Ok(user), Ok(assistant)) => {
                    self.verbatim.pop_front();
                    self.summarized.push_back(Turn { user, assistant });
                    stats.summarized += 1;
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!("⚠️ Memory summary failed, keeping turn verbatim: {:#}", e);
                    stats.failed = true;
                    return stats;
                }
            }
        }

        while self.summarized.len() > self.config.summarized_turns {
            let Some(turn) = self.summarized.front().cloned() else { break };
            let (user, assistant) = tokio::join!(
                compactor.fold(&self.user_digest, "user", &turn.user),
                compactor.fold(&self.assistant_digest, "chatbot", &turn.assistant),
            );
            match (user, assistant) {
                (Ok(user), Ok(assistant)) => {
                    self.summarized.pop_front();
                    self.user_digest = user;
                    self.assistant_digest = assistant;
                    stats.folded += 1;
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!("⚠️ Digest update failed, keeping summarized turn: {:#}", e);
                    stats.failed = true;
                    return stats;
                }
            }
        }

        debug!(?stats, verbatim = self.verbatim.len(), summarized = self.summarized.len(), "memory compacted");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::brain::llm::Role;
    use crate::modules::brain::testing::ScriptedModel;

    fn scripted() -> Arc<ScriptedModel> {
        Arc::new(
            ScriptedModel::new()
                .reply_when("Chat message to summarize", "short")
                .reply_when("Brief history", "digest"),
        )
    }

    fn memory() -> ChatMemory {
        ChatMemory::new(MemoryConfig { full_turns: 1, summarized_turns: 2 })
    }

    #[tokio::test]
    async fn single_turn_stays_verbatim() {
        let model = scripted();
        let compactor = MemoryCompactor::new(model.clone(), &LlmConfig::default(), "Icelandic");
        let mut mem = memory();
        mem.save_turn("q1", "a1");

        let stats = mem.compact(&compactor).await;
        assert_eq!(stats, CompactionStats::default());
        assert_eq!(model.completion_count(), 0);
    }

    #[tokio::test]
    async fn turns_move_down_the_tiers() {
        let model = scripted();
        let compactor = MemoryCompactor::new(model.clone(), &LlmConfig::default(), "Icelandic");
        let mut mem = memory();

        for i in 1..=4 {
            mem.save_turn(&format!("q{}", i), &format!("a{}", i));
            mem.compact(&compactor).await;
        }

        // q4 verbatim, q2/q3 summarized, q1 folded into the digest
        assert_eq!(mem.verbatim().len(), 1);
        assert_eq!(mem.verbatim()[0].user, "q4");
        assert_eq!(mem.summarized().len(), 2);
        assert!(mem.summarized().iter().all(|t| t.user == "short" && t.assistant == "short"));
        assert_eq!(mem.digests(), ("digest", "digest"));
        // 3 summaries and 1 fold, two calls each
        assert_eq!(model.completion_count(), 8);
        assert!(model.completions().iter().all(|r| r.messages[1].content.contains("Icelandic")));

        let rendered = mem.render("SYSTEM");
        assert_eq!(rendered.len(), 1 + 1 + 2 * 2 + 2);
        assert_eq!(rendered[0].content, "SYSTEM");
        assert_eq!(rendered[1].role, Role::System);
        assert!(rendered[1].content.contains("digest"));
        assert_eq!(rendered.last().unwrap().content, "a4");
    }

    #[tokio::test]
    async fn failure_keeps_turn_in_place() {
        let model = Arc::new(ScriptedModel::new().fail_when_prompt_contains("Chat message to summarize"));
        let compactor = MemoryCompactor::new(model.clone(), &LlmConfig::default(), "Icelandic");
        let mut mem = memory();
        mem.save_turn("q1", "a1");
        mem.save_turn("q2", "a2");

        let stats = mem.compact(&compactor).await;
        assert!(stats.failed);
        assert_eq!(stats.summarized, 0);
        assert_eq!(mem.verbatim().len(), 2);
        assert!(mem.summarized().is_empty());
    }
}
