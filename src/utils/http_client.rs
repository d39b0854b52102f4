use reqwest::Client;
use std::time::Duration;
use anyhow::Result;
use tracing::info;

use crate::config::settings::LlmConfig;

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Client for short JSON calls: classification, summaries, moderation, embeddings.
    pub fn create(llm: &LlmConfig) -> Result<Client> {
        let builder = Client::builder()
            .timeout(Duration::from_secs(llm.request_timeout_sec))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(30)));

        info!("🌐 [Http Client] request timeout {}s", llm.request_timeout_sec);

        let client = builder.build()?;
        Ok(client)
    }

    /// Client for streamed completions. Long total timeout so a slow answer is not cut mid-stream.
    pub fn create_streaming(llm: &LlmConfig) -> Result<Client> {
        let builder = Client::builder()
            .timeout(Duration::from_secs(llm.stream_timeout_sec))
            .connect_timeout(Duration::from_secs(30))
            .tcp_keepalive(Some(Duration::from_secs(30)));

        let client = builder.build()?;
        Ok(client)
    }
}
