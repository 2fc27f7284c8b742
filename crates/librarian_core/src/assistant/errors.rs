/// Errors raised while talking to the chat model. They are absorbed by the recommender and only
/// ever show up in the logs.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// The HTTP request could not be built, sent or finished in time, originating from `reqwest`.
    #[error("chat request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The chat endpoint answered with a non-success status code.
    #[error("chat endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// The response body did not contain a chat message.
    #[error("malformed chat response: {0}")]
    MalformedResponse(String),
}

#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
impl From<serde_json::Error> for AssistantError {
    fn from(error: serde_json::Error) -> Self {
        Self::MalformedResponse(error.to_string())
    }
}
