//! OpenAI-compatible chat-completions client.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::CompletionProvider;
use crate::config::AnalysisConfig;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

pub struct OpenAiCompletionProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompletionProvider {
    pub fn new(config: &AnalysisConfig) -> Self {
        info!(
            "Initialized completion provider (model: {}, base URL: {})",
            config.model, config.base_url
        );
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionProvider {
    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending completion request ({} chars)", prompt.len());

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.7,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read completion response body")?;

        if !status.is_success() {
            error!("Completion request failed with status {}: {}", status, body);
            bail!("Completion request failed with status {}: {}", status, body);
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).context("Failed to parse completion response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("Completion response contained no choices")?;

        debug!("Completion response: {} chars", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: &str) -> AnalysisConfig {
        AnalysisConfig {
            api_key: api_key.to_string(),
            base_url: "https://api.openai.com/v1/".to_string(),
            model: "gpt-4o".to_string(),
        }
    }

    #[test]
    fn test_is_configured() {
        assert!(OpenAiCompletionProvider::new(&config("key")).is_configured());
        assert!(!OpenAiCompletionProvider::new(&config("")).is_configured());
    }

    #[test]
    fn test_base_url_trimmed() {
        let provider = OpenAiCompletionProvider::new(&config("key"));
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "hello"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello");
    }
}
