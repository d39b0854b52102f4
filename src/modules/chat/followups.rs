use anyhow::{Context, Result};

use crate::modules::brain::llm::{CompletionRequest, LanguageModel};
use crate::modules::brain::prompts::followup_messages;
use super::protocol::{MessageKind, Outbox};

/// Questions wrapped in `<<...>>`, in order, trimmed and de-duplicated.
pub fn extract_followups(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("<<") {
        let after = &rest[start + 2..];
        let Some(end) = after.find(">>") else { break };
        let q = after[..end].trim();
        if !q.is_empty() && !found.iter().any(|f| f == q) {
            found.push(q.to_string());
        }
        rest = &after[end + 2..];
    }
    found
}

/// Streams follow-up suggestions between `start_followup` and `end_followup` frames.
pub async fn stream_followups(
    llm: &dyn LanguageModel,
    model: &str,
    max_tokens: u32,
    project_name: &str,
    question: &str,
    answer: &str,
    outbox: &Outbox,
) -> Result<String> {
    outbox.bot(MessageKind::StartFollowup, "").await?;

    let request = CompletionRequest::new(model, followup_messages(project_name, question, answer))
        .temperature(0.0)
        .max_tokens(max_tokens);
    let mut rx = llm.stream(&request).await.context("follow-up generation failed")?;

    let mut text = String::new();
    while let Some(delta) = rx.recv().await {
        let delta = delta?;
        text.push_str(&delta);
        outbox.bot(MessageKind::StreamFollowup, delta).await?;
    }

    outbox.bot(MessageKind::EndFollowup, "").await?;
    Ok(text)
}
