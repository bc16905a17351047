use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_MODEL;
use crate::error::{Error, Result};
use crate::llm::prompts::CompletionRequest;
use crate::llm::provider::LLMProvider;

pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    error: Option<ClaudeError>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ClaudeError {
    message: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl LLMProvider for ClaudeProvider {
    /// One Messages API call, no retry. Text blocks of the reply are joined;
    /// an API-level error or a reply with no text is an `LLMApi` error.
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        tracing::debug!(
            "Sending ~{} chars to Claude ({} max tokens)",
            request.prompt.len(),
            request.max_tokens
        );

        let request_body = ClaudeRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system,
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: request.prompt,
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| Error::LLMApi(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LLMApi(format!(
                "Claude API error ({}): {}",
                status, body
            )));
        }

        let result: ClaudeResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMApi(format!("Failed to parse Claude response: {}", e)))?;

        reply_text(result)
    }

    fn name(&self) -> &str {
        "Claude"
    }
}

fn reply_text(response: ClaudeResponse) -> Result<String> {
    if let Some(error) = response.error {
        return Err(Error::LLMApi(error.message));
    }

    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.content_type == "text")
        .filter_map(|block| block.text)
        .collect();

    if text.trim().is_empty() {
        return Err(Error::LLMApi("Empty response from Claude".to_string()));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> ClaudeResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_text_blocks_are_joined() {
        let reply = response(
            r#"{"content": [
                {"type": "text", "text": "{\"topics\": "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "[]}"}
            ]}"#,
        );
        assert_eq!(reply_text(reply).unwrap(), r#"{"topics": []}"#);
    }

    #[test]
    fn test_api_error_and_blank_reply_are_errors() {
        let overloaded = response(r#"{"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}"#);
        assert!(matches!(reply_text(overloaded), Err(Error::LLMApi(ref m)) if m == "Overloaded"));

        let blank = response(r#"{"content": [{"type": "text", "text": "  "}]}"#);
        assert!(matches!(reply_text(blank), Err(Error::LLMApi(_))));
    }
}
