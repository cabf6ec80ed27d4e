use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Non-2xx REST reply or a populated `error` object on a WS API reply.
    /// `body` keeps the raw payload so callers can inspect exchange-specific fields.
    #[error("API error: {code} - {message}")]
    ApiError {
        status: u16,
        code: i64,
        message: String,
        body: String,
    },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("Other error: {0}")]
    Other(String),
}

impl ExchangeError {
    /// Exchange error code for application errors, if any
    pub fn api_code(&self) -> Option<i64> {
        match self {
            Self::ApiError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Raw response payload attached to an application error
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            Self::ApiError { body, .. } => Some(body),
            _ => None,
        }
    }
}
