use reqwest::Client;
use anyhow::{Result, anyhow, Context};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::settings::LlmConfig;
use crate::utils::http_client::HttpClientFactory;

/// Longest input (in characters) sent to the embedding endpoint.
const MAX_EMBED_CHARS: usize = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(model: &str, messages: Vec<ChatMessage>) -> Self {
        Self { model: model.to_string(), messages, temperature: 0.0, max_tokens: None }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn to_body(&self, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.messages,
            "temperature": self.temperature,
        });
        if let Some(max) = self.max_tokens {
            body["max_tokens"] = json!(max);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }
}

/// Hosted language model: completions, streamed completions, moderation and embeddings.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Token deltas in arrival order. The channel closes when the answer is complete.
    async fn stream(&self, request: &CompletionRequest) -> Result<mpsc::Receiver<Result<String>>>;

    /// `true` when the text is flagged.
    async fn moderate(&self, text: &str) -> Result<bool>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Client for an OpenAI-compatible API.
pub struct OpenAiClient {
    client: Client,
    stream_client: Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
    moderation_model: Option<String>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: HttpClientFactory::create(config)?,
            stream_client: HttpClientFactory::create_streaming(config)?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
            moderation_model: config.moderation_model.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    fn check_key(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(anyhow!("OPENAI_API_KEY missing. Check .env"));
        }
        Ok(())
    }

    /// POSTs `body` to `path`, retrying transport errors and non-success statuses.
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        self.check_key()?;
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = anyhow!("{} not attempted", path);

        for attempt in 1..=self.max_attempts {
            match self.client.post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        match resp.json::<Value>().await {
                            Ok(v) => {
                                if attempt > 1 {
                                    info!("✅ {} recovered on attempt {}", path, attempt);
                                }
                                return Ok(v);
                            }
                            Err(e) => last_error = anyhow!("Failed to parse JSON from {}: {}", path, e),
                        }
                    } else {
                        let err_text = resp.text().await.unwrap_or_default();
                        last_error = anyhow!("{} API Error [{}]: {}", path, status, err_text);
                    }
                }
                Err(e) => last_error = anyhow!("{} Network Error: {}", path, e),
            }

            warn!("⚠️ LLM call failed (attempt {}/{}): {}", attempt, self.max_attempts, last_error);
            if attempt < self.max_attempts {
                sleep(self.retry_delay).await;
            }
        }

        Err(last_error)
    }

    async fn open_stream(&self, body: &Value) -> Result<reqwest::Response> {
        self.check_key()?;
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = anyhow!("stream not attempted");

        for attempt in 1..=self.max_attempts {
            match self.stream_client.post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let err_text = resp.text().await.unwrap_or_default();
                    last_error = anyhow!("stream API Error [{}]: {}", status, err_text);
                }
                Err(e) => last_error = anyhow!("stream Network Error: {}", e),
            }

            warn!("⚠️ Stream open failed (attempt {}/{}): {}", attempt, self.max_attempts, last_error);
            if attempt < self.max_attempts {
                sleep(self.retry_delay).await;
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let resp = self.post_json("/chat/completions", &request.to_body(false)).await
            .with_context(|| format!("{} completion failed", request.model))?;

        let content = resp["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("{} returned no message content", request.model))?;
        Ok(clean_reasoning_content(content))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<mpsc::Receiver<Result<String>>> {
        let (tx, rx) = mpsc::channel(100);
        let response = self.open_stream(&request.to_body(true)).await
            .with_context(|| format!("{} stream failed to open", request.model))?;

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(anyhow!("stream interrupted: {}", e))).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();
                    if !forward_line(&tx, &String::from_utf8_lossy(&line_bytes)).await {
                        return;
                    }
                }
            }

            // body may end without a trailing newline
            if !buffer.is_empty() && !forward_line(&tx, &String::from_utf8_lossy(&buffer)).await {
                return;
            }
            warn!("⚠️ Completion stream ended before [DONE]");
            let _ = tx.send(Err(anyhow!("stream ended before [DONE]"))).await;
        });

        Ok(rx)
    }

    async fn moderate(&self, text: &str) -> Result<bool> {
        let mut body = json!({ "input": text });
        if let Some(model) = &self.moderation_model {
            body["model"] = json!(model);
        }

        let resp = self.post_json("/moderations", &body).await.context("moderation failed")?;
        resp["results"][0]["flagged"]
            .as_bool()
            .ok_or_else(|| anyhow!("moderation response without results"))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let safe_text: String = text.chars().take(MAX_EMBED_CHARS).collect();

        let body = json!({
            "model": self.embedding_model,
            "input": safe_text,
            "encoding_format": "float"
        });

        let resp = self.post_json("/embeddings", &body).await.context("embedding failed")?;
        let data = resp["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| anyhow!("Invalid JSON format from embeddings endpoint"))?;

        Ok(data.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
    }
}

/// Forwards one SSE line. Returns `false` once the stream is finished or the receiver is gone.
async fn forward_line(tx: &mpsc::Sender<Result<String>>, line: &str) -> bool {
    match parse_sse_line(line) {
        SseEvent::Delta(text) => {
            if tx.send(Ok(text)).await.is_err() {
                debug!("[STREAM] receiver dropped");
                return false;
            }
            true
        }
        SseEvent::Done => false,
        SseEvent::Skip => true,
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum SseEvent {
    Delta(String),
    Done,
    Skip,
}

/// Parses one `data: ...` line of a chat-completions event stream.
pub(crate) fn parse_sse_line(line: &str) -> SseEvent {
    let Some(payload) = line.trim().strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return SseEvent::Done;
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(v) => match v["choices"][0]["delta"]["content"].as_str() {
            Some(text) if !text.is_empty() => SseEvent::Delta(text.to_string()),
            _ => SseEvent::Skip,
        },
        Err(_) => SseEvent::Skip,
    }
}

/// Drops a leading `<think>...</think>` block emitted by reasoning models.
pub fn clean_reasoning_content(raw: &str) -> String {
    let mut clean = raw.to_string();
    if let (Some(start), Some(end)) = (clean.find("<think>"), clean.find("</think>")) {
        if end > start {
            let after = clean[end + "</think>".len()..].to_string();
            clean.truncate(start);
            clean.push_str(&after);
        }
    }
    clean.trim().to_string()
}

/// Pulls a JSON object out of a model reply that may wrap it in fences or prose.
pub fn extract_json(raw_response: &str) -> Result<Value> {
    let cleaned = clean_reasoning_content(raw_response);
    if let Ok(v) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(v);
    }
    if let Some(start) = cleaned.find("```json") {
        let after_start = &cleaned[start + 7..];
        if let Some(real_end) = after_start.find("```") {
            if let Ok(v) = serde_json::from_str::<Value>(&after_start[..real_end]) {
                return Ok(v);
            }
        }
    }
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if end > start {
            if let Ok(v) = serde_json::from_str::<Value>(&cleaned[start..=end]) {
                return Ok(v);
            }
        }
    }
    Err(anyhow!("Failed to extract JSON from response"))
}
