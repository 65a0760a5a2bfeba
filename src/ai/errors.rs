#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AiError {
    /// No API key configured for the given endpoint. Checked before any
    /// network call is made.
    #[error("{0} API key is not configured")]
    NotConfigured(&'static str),

    /// Caller-supplied input was rejected before dispatch.
    #[error("{0}")]
    Validation(String),

    /// The provider returned an error, timed out, or produced a response
    /// we could not make sense of.
    #[error("{0}")]
    Upstream(String),
}

impl AiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AiError::Validation(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        AiError::Upstream(msg.into())
    }
}
