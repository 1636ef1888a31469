use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::prompts;
use crate::db::models::{BroadcastEvent, Judgement, MicroBetDraft, MicroBetOption, PlayRecord};
use crate::error::{GenerationError, JudgeError, ServiceError};
use crate::microbet::{OutcomeJudge, PredictionGenerator};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
///
/// Serves as both the prediction generator and the outcome judge. Without an
/// API key every call fails fast with [`ServiceError::NotConfigured`], which
/// callers treat like any other outage.
#[derive(Clone)]
pub struct GenAiClient {
    http: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl GenAiClient {
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(GenAiClient {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn chat(&self, system: &str, user: &str, temperature: f32) -> Result<String, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::NotConfigured)?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
        };

        let url = format!("{}/chat/completions", self.api_url);
        debug!("POST {} (model {})", url, self.model);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Status { status, body });
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ServiceError::EmptyResponse)
    }
}

#[async_trait]
impl PredictionGenerator for GenAiClient {
    async fn generate(&self, window: &[BroadcastEvent]) -> Result<MicroBetDraft, GenerationError> {
        let prompt = prompts::generation_prompt(window);
        let content = self.chat(prompts::GENERATION_SYSTEM, &prompt, 0.8).await?;
        prompts::parse_draft(&content).map_err(GenerationError::Malformed)
    }
}

#[async_trait]
impl OutcomeJudge for GenAiClient {
    async fn judge(
        &self,
        options: &[MicroBetOption; 2],
        play: &PlayRecord,
    ) -> Result<Judgement, JudgeError> {
        let prompt = prompts::judge_prompt(options, play);
        let content = self.chat(prompts::JUDGE_SYSTEM, &prompt, 0.0).await?;
        prompts::parse_judgement(&content).map_err(JudgeError::Malformed)
    }
}
