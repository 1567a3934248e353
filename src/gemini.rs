//! Gemini API client
//!
//! Sends the full conversation history plus a per-turn system instruction
//! and returns the model's text. Uses a long-lived reqwest::Client for
//! connection pooling, with a hard per-call timeout so a stalled upstream
//! cannot hang a turn.

use crate::error::{AssistantError, Result};
use crate::session::{ChatEntry, ChatRole};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const GEMINI_MODEL_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash-latest:generateContent";

/// Hard cap on one model call
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: GEMINI_MODEL_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(api_key: String, base_url: String) -> Self {
        let mut client = Self::new(api_key);
        client.base_url = base_url;
        client
    }

    /// One model call over the full history. Deterministic generation
    /// settings keep calculations reproducible across turns.
    pub async fn generate(&self, history: &[ChatEntry], system_instruction: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AssistantError::ModelNotConfigured(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);
        let request = GeminiRequest::from_history(history, system_instruction);

        info!("Calling Gemini API with {} history message(s)", history.len());

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AssistantError::ModelTransport(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response ({}): {}", status, error_text);
            return Err(AssistantError::ModelApi(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AssistantError::ModelApi(format!("Gemini parse error: {}", e))
        })?;

        let answer = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                AssistantError::EmptyModelResponse(
                    "Failed to get a valid response from Gemini".to_string(),
                )
            })?;

        info!("Gemini response received ({} chars)", answer.len());

        Ok(answer)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    system_instruction: SystemInstruction,
    generation_config: GenerationConfig,
}

impl GeminiRequest {
    fn from_history(history: &[ChatEntry], system_instruction: &str) -> Self {
        let contents = history
            .iter()
            .map(|entry| Content {
                parts: vec![Part {
                    text: entry.text.clone(),
                }],
                role: Some(match entry.role {
                    ChatRole::User => "user".to_string(),
                    ChatRole::Model => "model".to_string(),
                }),
            })
            .collect();

        Self {
            contents,
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            },
            generation_config: GenerationConfig {
                temperature: 0.0,
                top_p: 0.1,
                top_k: 40,
                max_output_tokens: 2048,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
