use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use insights_store::InsightsConfig;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

/// Upper bound on a single completion call, so one hung request cannot stall `watch`.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const SYSTEM_PROMPT: &str = "You're analyzing Slack conversations to identify:
1. Key issues or problems mentioned
2. Action items that need attention
3. Emerging risks to the business
4. Positive developments
5. Sentiment summary
Respond with a structured JSON with these categories.";

/// Turns a channel transcript into a structured analysis document.
#[async_trait]
pub trait ChannelAnalyst: Send + Sync {
    async fn analyze(&self, transcript: &str) -> Result<Value>;
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build LLM http client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        })
    }

    /// `Ok(None)` when no API key is configured.
    pub fn from_config(config: &InsightsConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.openai_api_key.clone() else {
            return Ok(None);
        };
        Self::new(
            api_key,
            config.openai_model.clone(),
            config.openai_base_url.clone(),
        )
        .map(Some)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, transcript: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(transcript)}
            ],
            "response_format": {"type": "json_object"},
        })
    }
}

#[async_trait]
impl ChannelAnalyst for LlmClient {
    async fn analyze(&self, transcript: &str) -> Result<Value> {
        let res = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(transcript))
            .send()
            .await
            .context("send chat request")?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            bail!("LLM call failed: {} - {}", status, text);
        }

        let json: Value = res.json().await.context("decode chat response")?;
        parse_completion(&json)
    }
}

fn user_prompt(transcript: &str) -> String {
    format!("Analyze these Slack messages from a business channel:\n\n{transcript}")
}

/// Extracts the first choice's content and parses it as the analysis document.
pub fn parse_completion(response: &Value) -> Result<Value> {
    let content = response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("invalid response format from LLM"))?;
    serde_json::from_str::<Value>(content).context("analysis content is not valid JSON")
}
