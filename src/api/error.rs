use thiserror::Error;

/// Everything that can go wrong talking to the backend.
///
/// Callers surface these as a single message plus an optional status code;
/// nothing is retried automatically.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("API call failed: {status} {status_text}")]
    Status {
        status: u16,
        status_text: String,
        /// `error` field of the response body, when the server sent one
        message: Option<String>,
    },

    #[error("Malformed response body: {0}")]
    MalformedBody(String),

    #[error("Unexpected response shape: missing {0}")]
    Shape(String),

    #[error("{0}")]
    Rejected(String),
}

impl ApiError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for an inline error banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status {
                message: Some(m), ..
            } => m.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}
