//! Coaching client: the two remote operations the conversation relies on.
//!
//! `GeminiClient` talks to the Generative Language `generateContent` method
//! directly with reqwest.

use crate::config::Config;
use crate::conversation::{Message, Role};
use crate::summary::SummaryRecord;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// User-Agent string identifying this client
const USER_AGENT: &str = concat!("refine/", env!("CARGO_PKG_VERSION"));

/// Sampling temperature for coaching replies
pub const TEMPERATURE: f64 = 0.7;

/// Returned when the model produces an empty reply
pub const EMPTY_REPLY: &str = "Sorry, I couldn't get a response.";

/// Returned when extraction produces no content
pub const EMPTY_SUMMARY: &str = "{}";

const SYSTEM_INSTRUCTION: &str = "\
You are a life-improvement coach. You help the user sort out where they are \
and turn it into action. Never judge or lecture; put feasibility first.

Follow this flow strictly:
1. Ask about what is not going well right now, in terms of behaviour, habits and environment.
2. Confirm the ideal the user wants to reach, as a concrete state.
3. Briefly lay out the gap between the current state and the ideal, based on facts.
4. Pick one or two points with high impact that can be moved right now.
5. Propose a small action flow that can be done today or this week.

The action flow must be realistic and easy to restart after a slip.
Always leave the final choice to the user; never push.
Keep replies warm and choose positive words.
Do not rush through every step at once; go one step at a time.";

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("LLM returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Remote operations used by the orchestrator.
#[async_trait]
pub trait CoachingClient: Send + Sync {
    /// Produce the coach's next reply given the full, ordered history.
    ///
    /// Never returns an empty string.
    async fn continue_conversation(&self, history: &[Message]) -> Result<String, AgentError>;

    /// Extract a raw JSON summary payload from the full history.
    ///
    /// Returns `"{}"` when the model yields nothing.
    async fn extract_summary(&self, history: &[Message]) -> Result<String, AgentError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

impl Content {
    fn text(role: Option<&'static str>, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.into() }],
        }
    }
}

/// Gemini-backed coaching client.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AgentError> {
        let client = Self::new(
            config.gemini_key()?,
            &config.agent.model,
            Duration::from_secs(config.agent.timeout_secs),
        )?;
        Ok(client.with_base_url(&config.agent.base_url))
    }

    /// Override the API base URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn generate(&self, request: &GenerateContentRequest) -> Result<String, AgentError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Decode(e.to_string()))?;
        Ok(body.text())
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

/// Build the single-shot extraction prompt over a `role: text` transcript.
fn extraction_prompt(history: &[Message]) -> String {
    let transcript = history
        .iter()
        .map(|m| format!("{}: {}", m.role(), m.text()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Based on the conversation so far, summarise the following items concisely and output them as JSON.
Items:
- currentIssues (what is not working right now)
- idealState (the state the user wants to reach)
- gap (the gap between the current state and the ideal)
- leveragePoints (one or two points to focus on)
- actionFlow (a concrete action flow)

Omit any item the conversation has not covered yet.
The JSON must match this schema:
{}

Conversation:
{}
"#,
        SummaryRecord::json_schema(),
        transcript
    )
}

#[async_trait]
impl CoachingClient for GeminiClient {
    async fn continue_conversation(&self, history: &[Message]) -> Result<String, AgentError> {
        let request = GenerateContentRequest {
            contents: history
                .iter()
                .map(|m| Content::text(Some(wire_role(m.role())), m.text()))
                .collect(),
            system_instruction: Some(Content::text(None, SYSTEM_INSTRUCTION)),
            generation_config: GenerationConfig {
                temperature: Some(TEMPERATURE),
                ..Default::default()
            },
        };

        let text = self.generate(&request).await?;
        if text.trim().is_empty() {
            tracing::debug!(model = %self.model, "empty conversation reply");
            return Ok(EMPTY_REPLY.to_string());
        }
        Ok(text)
    }

    async fn extract_summary(&self, history: &[Message]) -> Result<String, AgentError> {
        let request = GenerateContentRequest {
            contents: vec![Content::text(None, extraction_prompt(history))],
            system_instruction: None,
            generation_config: GenerationConfig {
                response_mime_type: Some("application/json"),
                ..Default::default()
            },
        };

        let text = self.generate(&request).await?;
        if text.trim().is_empty() {
            return Ok(EMPTY_SUMMARY.to_string());
        }
        Ok(text)
    }
}
