use crate::assistant::errors::AssistantError;
use core::future::Future;
use core::time::Duration;
use reqwest::{ClientBuilder, header};
use serde::{Deserialize, Serialize};

/// Anything that can answer a single system + user chat exchange with plain text.
pub trait ChatCompletion: Send + Sync {
    /// Sends `system` and `user` as one conversation and returns the model's reply
    /// # Errors
    /// Fails if the service cannot be reached or its answer cannot be read
    fn complete(
        &self,
        system: &str,
        user: &str,
    ) -> impl Future<Output = Result<String, AssistantError>> + Send;
}

/// Connection settings for an Ollama compatible chat endpoint.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL of the API, without trailing slash
    pub base_url: String,
    pub model: String,
    /// Upper bound for a whole chat request
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            base_url: String::from("http://localhost:11434"),
            model: String::from("llama3.2"),
            timeout_secs: 120,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'msg> {
    model: &'msg str,
    messages: [ChatMessage<'msg>; 2],
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'msg> {
    role: &'static str,
    content: &'msg str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Non-streaming client for the `/api/chat` endpoint of Ollama.
pub struct OllamaChatClient {
    /// A HTTP client reused for all chat requests
    http_client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaChatClient {
    /// Create a new chat client for the given endpoint
    /// # Errors
    /// Fails if the underlying HTTP client cannot be constructed
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub fn new(config: OllamaConfig) -> Result<Self, AssistantError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        let http_client = ClientBuilder::new()
            .user_agent(concat!("librarian/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(1)
            .build()?;

        Ok(Self {
            http_client,
            config,
        })
    }
}

impl ChatCompletion for OllamaChatClient {
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    async fn complete(&self, system: &str, user: &str) -> Result<String, AssistantError> {
        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            stream: false,
        };

        let response = self.http_client.post(&url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AssistantError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_chat_response(&body)
    }
}

/// Pulls the assistant's text out of a non-streaming chat response body
fn parse_chat_response(body: &str) -> Result<String, AssistantError> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .message
        .and_then(|message| message.content)
        .ok_or_else(|| AssistantError::MalformedResponse(String::from("missing message.content")))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{
            "model": "llama3.2",
            "created_at": "2025-01-01T00:00:00Z",
            "message": {"role": "assistant", "content": "Read Dune."},
            "done": true
        }"#;
        assert_eq!(parse_chat_response(body).unwrap(), "Read Dune.");
    }

    #[test]
    fn test_parse_chat_response_without_message() {
        assert!(matches!(
            parse_chat_response(r#"{"error": "model not found"}"#),
            Err(AssistantError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_chat_response(r#"{"message": {"role": "assistant"}}"#),
            Err(AssistantError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_chat_response_invalid_json() {
        assert!(matches!(
            parse_chat_response("<html>502 Bad Gateway</html>"),
            Err(AssistantError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "llama3.2",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "be helpful",
                },
                ChatMessage {
                    role: "user",
                    content: "sci-fi",
                },
            ],
            stream: false,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "model": "llama3.2",
                "messages": [
                    {"role": "system", "content": "be helpful"},
                    {"role": "user", "content": "sci-fi"}
                ],
                "stream": false
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let client = OllamaChatClient::new(OllamaConfig {
            base_url: String::from("http://127.0.0.1:1"),
            timeout_secs: 5,
            ..OllamaConfig::default()
        })
        .unwrap();
        assert!(matches!(
            client.complete("system", "user").await,
            Err(AssistantError::Request(_))
        ));
    }
}
