//! OpenAI-compatible chat-completions client used for both external
//! collaborators: query paraphrasing and relevance scoring.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use kbrag_core::config::LlmConfig;
use kbrag_core::traits::{Paraphraser, RelevanceClassifier};

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    config: LlmConfig,
}

#[derive(Debug, Deserialize)]
struct VariantsReply {
    #[serde(default)]
    variants: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ScoresReply {
    #[serde(default)]
    scores: Vec<f32>,
}

impl OpenAiClient {
    /// Reads the API key from the variable named by `config.api_key_env`.
    /// Local endpoints work without a key.
    pub fn from_env(config: &LlmConfig) -> Result<Self> {
        let is_local = config.base_url.contains("localhost") || config.base_url.contains("127.0.0.1");
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ if is_local => {
                tracing::debug!("no API key for local endpoint, using a placeholder bearer token");
                "local".to_string()
            }
            _ => bail!("environment variable '{}' is not set", config.api_key_env),
        };
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, base_url: config.base_url.trim_end_matches('/').to_string(), api_key, config: config.clone() })
    }

    /// Sends one JSON-mode user message and returns the assistant content.
    async fn complete_json(&self, prompt: String, temperature: f32, max_tokens: u32) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
            "max_tokens": max_tokens,
            "response_format": { "type": "json_object" },
            "stream": false,
        });
        tracing::debug!(url = %url, model = %self.config.model, "sending completion request");
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("completion request failed")?;
        let status = response.status();
        let text = response.text().await.context("reading completion response")?;
        if !status.is_success() {
            bail!("HTTP {status}: {}", text.chars().take(200).collect::<String>());
        }
        let value: Value = serde_json::from_str(&text).context("completion response is not JSON")?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("completion response has no message content"))
    }
}

fn paraphrase_prompt(query: &str, count: usize) -> String {
    format!(
        "Перефразируй вопрос пациента о стоматологии в {count} разных варианта для поиска информации.\n\n\
         Исходный вопрос: \"{query}\"\n\n\
         Варианты: более формальный, более бытовой, с синонимами.\n\n\
         Верни ТОЛЬКО JSON: {{\"variants\": [\"вариант 1\", \"вариант 2\"]}}"
    )
}

fn scoring_prompt(query: &str, passages: &[String]) -> String {
    let mut listed = String::new();
    for (i, p) in passages.iter().enumerate() {
        listed.push_str(&format!("{}. {}\n\n", i + 1, p));
    }
    format!(
        "Оцени релевантность каждого фрагмента вопросу пациента по шкале от 0 до 1.\n\n\
         Вопрос: \"{query}\"\n\n\
         Фрагменты:\n{listed}\
         Верни ТОЛЬКО JSON с оценками в том же порядке: {{\"scores\": [0.9, 0.3]}}"
    )
}

#[async_trait]
impl Paraphraser for OpenAiClient {
    async fn paraphrase(&self, query: &str, count: usize) -> Result<Vec<String>> {
        let content = self
            .complete_json(paraphrase_prompt(query, count), self.config.paraphrase_temperature, self.config.max_tokens)
            .await?;
        let reply: VariantsReply = serde_json::from_str(&content).context("malformed variants reply")?;
        Ok(reply.variants)
    }
}

#[async_trait]
impl RelevanceClassifier for OpenAiClient {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() { return Ok(Vec::new()); }
        // one short number per passage plus JSON framing
        let budget = u32::try_from(passages.len()).unwrap_or(u32::MAX).saturating_mul(8).saturating_add(32);
        let content = self
            .complete_json(scoring_prompt(query, passages), self.config.rerank_temperature, budget.max(self.config.max_tokens))
            .await?;
        let reply: ScoresReply = serde_json::from_str(&content).context("malformed scores reply")?;
        Ok(reply.scores)
    }
}
