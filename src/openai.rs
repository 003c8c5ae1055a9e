use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::error::{truncate_reason, ProviderError};
use crate::provider::TranslationProvider;

/// OpenAI Chat Completion request for translation
#[derive(Debug, Serialize)]
struct TranslationRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
}

/// Check if a model is a reasoning model that doesn't support temperature
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("gpt-5")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Build the system prompt for translating one CMS field
fn build_system_prompt(source_lang: &str, target_lang: &str) -> String {
    format!(
        r#"You are a professional translator for a website's blog. Translate the user's text from the language with ISO 639-1 code "{source}" to the language with ISO 639-1 code "{target}".

## Rules
- Preserve all HTML tags, attributes and Markdown formatting exactly
- Do not translate URLs, email addresses, code snippets or product names
- Keep the tone and meaning of the original
- Reply with the translated text only, without quotes, notes or explanations"#,
        source = source_lang,
        target = target_lang,
    )
}

/// Translation backend over the OpenAI chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_url: String,
}

impl OpenAiProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            api_url: api_url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.openai_api_key.clone(),
            config.openai_model.clone(),
            config.openai_api_url.clone(),
        )
    }

    /// Use a client with a request timeout below the per-item timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        if let Ok(client) = reqwest::Client::builder().timeout(timeout).build() {
            self.client = client;
        }
        self
    }

    fn build_request(&self, text: &str, source_lang: &str, target_lang: &str) -> TranslationRequest {
        // Reasoning models don't support temperature - use reasoning_effort instead
        let is_reasoning = is_reasoning_model(&self.model);
        TranslationRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: build_system_prompt(source_lang, target_lang),
                },
                Message {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: if is_reasoning { None } else { Some(0.3) },
            reasoning_effort: if is_reasoning {
                Some("low".to_string())
            } else {
                None
            },
        }
    }
}

/// Retry 429 (rate limit) and 5xx errors; other 4xx are the caller's fault
fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl TranslationProvider for OpenAiProvider {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, ProviderError> {
        let request = self.build_request(text, source_lang, target_lang);

        // Network errors and timeouts are transient
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transient(format!("translation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            let message = truncate_reason(&format!("OpenAI API error ({}): {}", status, body));
            return Err(ProviderError {
                transient: is_transient_status(status),
                message,
            });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::permanent(format!("failed to parse OpenAI translation response: {}", e))
        })?;

        let translated = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| {
                ProviderError::permanent("OpenAI translation response contained no choices")
            })?;

        if translated.is_empty() && !text.trim().is_empty() {
            return Err(ProviderError::permanent(
                "OpenAI returned an empty translation",
            ));
        }

        Ok(translated)
    }
}
