//! Deterministic `LanguageModel` for unit tests.

use std::sync::Mutex;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::llm::{CompletionRequest, LanguageModel};

enum Reply {
    Text(String),
    Fail(String),
}

/// Answers by rule: the first rule whose needle occurs in the prompt wins,
/// otherwise the last message is echoed behind a prefix.
pub struct ScriptedModel {
    rules: Vec<(String, Reply)>,
    prefix: String,
    flagged: Vec<String>,
    dim: usize,
    completions: Mutex<Vec<CompletionRequest>>,
    streams: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::echo_prefix("")
    }

    pub fn echo_prefix(prefix: &str) -> Self {
        Self {
            rules: Vec::new(),
            prefix: prefix.to_string(),
            flagged: Vec::new(),
            dim: 16,
            completions: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn reply_when(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), Reply::Text(reply.to_string())));
        self
    }

    pub fn fail_when_prompt_contains(mut self, needle: &str) -> Self {
        self.rules.push((needle.to_string(), Reply::Fail(format!("scripted failure on '{}'", needle))));
        self
    }

    pub fn flag(mut self, word: &str) -> Self {
        self.flagged.push(word.to_lowercase());
        self
    }

    pub fn completion_count(&self) -> usize {
        self.completions.lock().unwrap().len()
    }

    pub fn completions(&self) -> Vec<CompletionRequest> {
        self.completions.lock().unwrap().clone()
    }

    pub fn streams(&self) -> Vec<CompletionRequest> {
        self.streams.lock().unwrap().clone()
    }

    fn resolve(&self, request: &CompletionRequest) -> Result<String> {
        let prompt: String = request.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n");
        for (needle, reply) in &self.rules {
            if prompt.contains(needle.as_str()) {
                return match reply {
                    Reply::Text(t) => Ok(t.clone()),
                    Reply::Fail(msg) => Err(anyhow!(msg.clone())),
                };
            }
        }
        let last = request.messages.last().map(|m| m.content.trim()).unwrap_or("");
        Ok(format!("{}{}", self.prefix, last))
    }
}

/// Bag-of-words hashing embedding, so texts sharing words land close together.
pub fn hash_embedding(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dim];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let h = word.to_lowercase().bytes().fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        v[(h % dim as u64) as usize] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.completions.lock().unwrap().push(request.clone());
        self.resolve(request)
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<mpsc::Receiver<Result<String>>> {
        self.streams.lock().unwrap().push(request.clone());
        let reply = self.resolve(request)?;
        let pieces: Vec<String> = reply.split_inclusive(' ').map(str::to_string).collect();
        let (tx, rx) = mpsc::channel(pieces.len() + 1);
        for piece in pieces {
            let _ = tx.send(Ok(piece)).await;
        }
        Ok(rx)
    }

    async fn moderate(&self, text: &str) -> Result<bool> {
        let lower = text.to_lowercase();
        Ok(self.flagged.iter().any(|w| lower.contains(w.as_str())))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hash_embedding(text, self.dim))
    }
}
