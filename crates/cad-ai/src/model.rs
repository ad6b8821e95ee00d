use async_trait::async_trait;

/// What a [`LanguageModel`] receives for one completion.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub instruction: &'a str,
    pub content: &'a [String],
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model reply contained no text")]
    EmptyReply,
    #[error("{0}")]
    Unavailable(String),
}

/// A generative model that turns an instruction into a text completion.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<String, ModelError>;
}
