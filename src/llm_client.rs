use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A hosted text-generation service addressed by model id.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct LlmClient {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

/// Non-success HTTP status from the completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmApiError {
    pub status: u16,
    pub body: String,
}

impl fmt::Display for LlmApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LLM API returned error {}: {}", self.status, self.body)
    }
}

impl std::error::Error for LlmApiError {}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

impl LlmClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, client: reqwest::Client) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.unwrap_or_default(),
            client,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Generate a completion with a specific model using the OpenAI API format
    pub async fn generate_with_model(&self, messages: Vec<Message>, model: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_url);

        let request = ChatCompletionRequest {
            model,
            messages,
            temperature: Some(0.7),
            max_tokens: Some(1000),
        };

        let mut req = self.client.post(&url).json(&request);

        // Local OpenAI-compatible servers run without a key
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = req.send().await.context("Failed to send LLM request")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            return Err(LlmApiError { status, body }.into());
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let messages = vec![Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];
        self.generate_with_model(messages, model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_unset_sampling_fields() {
        let request = ChatCompletionRequest {
            model: "gemini-2.5-flash",
            messages: vec![Message {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            temperature: None,
            max_tokens: Some(10),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gemini-2.5-flash");
        assert_eq!(value["messages"][0]["role"], "user");
        assert!(value.get("temperature").is_none());
        assert_eq!(value["max_tokens"], 10);
    }

    #[test]
    fn completion_response_takes_first_choice() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"Go read."}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Go read.");
    }

    #[test]
    fn api_error_is_recoverable_through_anyhow() {
        let err: anyhow::Error = LlmApiError {
            status: 404,
            body: "model not found".to_string(),
        }
        .into();
        assert_eq!(err.downcast_ref::<LlmApiError>().map(|e| e.status), Some(404));
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let client = LlmClient::new("http://localhost:11434/v1/", None, reqwest::Client::new());
        assert_eq!(client.api_url(), "http://localhost:11434/v1");
    }
}
