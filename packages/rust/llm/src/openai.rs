//! OpenAI-compatible chat and embeddings client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use pagewright_shared::{LlmConfig, PagewrightError, Result};

use crate::{Embedder, LanguageModel, OutputSchema};

/// User-Agent string for model requests.
const USER_AGENT: &str = concat!("Pagewright/", env!("CARGO_PKG_VERSION"));

/// Generation can be slow for long pages.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Inputs per embeddings request.
const EMBED_BATCH_SIZE: usize = 64;

/// Client for `/chat/completions` and `/embeddings`.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    temperature: f32,
    embedding_model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiClient {
    /// Create a client from config and an API key.
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| PagewrightError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model: config.chat_model.clone(),
            temperature: config.temperature,
            embedding_model: config.embedding_model.clone(),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| PagewrightError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PagewrightError::Network(format!("{url}: failed to read body: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| text.chars().take(200).collect());
            return Err(PagewrightError::Llm(format!("{path}: HTTP {status}: {message}")));
        }

        serde_json::from_str(&text)
            .map_err(|e| PagewrightError::Llm(format!("{path}: invalid response JSON: {e}")))
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.chat_model, schema = %schema.name))]
    async fn invoke_with_schema(
        &self,
        system: &str,
        human: &[String],
        schema: &OutputSchema,
    ) -> Result<Value> {
        let mut messages = vec![json!({ "role": "system", "content": system })];
        messages.extend(human.iter().map(|h| json!({ "role": "user", "content": h })));

        let body = json!({
            "model": self.chat_model,
            "temperature": self.temperature,
            "messages": messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.schema,
                }
            }
        });

        let start = Instant::now();
        let raw = self.post("/chat/completions", &body).await?;
        let response: ChatResponse = serde_json::from_value(raw)
            .map_err(|e| PagewrightError::Llm(format!("unexpected chat response shape: {e}")))?;

        if let Some(usage) = &response.usage {
            info!(
                tokens_in = usage.prompt_tokens,
                tokens_out = usage.completion_tokens,
                latency_ms = start.elapsed().as_millis() as u64,
                "chat completion finished"
            );
        }

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| PagewrightError::Llm("chat response had no choices".into()))?;

        if let Some(refusal) = message.refusal {
            return Err(PagewrightError::Llm(format!("model refused: {refusal}")));
        }

        let content = message
            .content
            .ok_or_else(|| PagewrightError::Schema("model returned no content".into()))?;

        serde_json::from_str(&content).map_err(|e| {
            PagewrightError::Schema(format!(
                "model output is not valid JSON: {e} (got: {})",
                content.chars().take(200).collect::<String>()
            ))
        })
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let body = json!({ "model": self.embedding_model, "input": batch });
            let raw = self.post("/embeddings", &body).await?;
            let mut response: EmbeddingResponse = serde_json::from_value(raw).map_err(|e| {
                PagewrightError::Llm(format!("unexpected embeddings response shape: {e}"))
            })?;

            if response.data.len() != batch.len() {
                return Err(PagewrightError::Llm(format!(
                    "asked for {} embeddings, got {}",
                    batch.len(),
                    response.data.len()
                )));
            }

            response.data.sort_by_key(|d| d.index);
            vectors.extend(response.data.into_iter().map(|d| d.embedding));
        }

        debug!(count = vectors.len(), "embedded documents");
        Ok(vectors)
    }

    fn model_id(&self) -> &str {
        &self.embedding_model
    }
}
