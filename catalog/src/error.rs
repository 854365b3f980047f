use thiserror::Error;

/// Failures surfaced by the catalog API client.
///
/// `NotFound` is kept distinct from other status errors so a detail view
/// can render a not-found page instead of a retryable error. The error is
/// cloneable because terminal failures live in the query cache alongside
/// data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The resource does not exist (HTTP 404).
    #[error("resource not found")]
    NotFound,

    /// Any other non-2xx response.
    #[error("server responded with status {0}")]
    Status(u16),

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The response body was not the expected JSON shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether this error is the distinct not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }

    /// Whether a retry could plausibly succeed. Not-found and decode
    /// failures are deterministic; retrying them only burns requests.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::NotFound | ApiError::Decode(_) => false,
            ApiError::Status(_) | ApiError::Network(_) => true,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ApiError::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            if status == reqwest::StatusCode::NOT_FOUND {
                ApiError::NotFound
            } else {
                ApiError::Status(status.as_u16())
            }
        } else {
            ApiError::Network(error.to_string())
        }
    }
}
