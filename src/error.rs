/// Typed errors for everything that talks to the backend or validates input
/// before a request is made.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Payload too large (HTTP 413)")]
    PayloadTooLarge,
    #[error("Rate limited (HTTP 429)")]
    RateLimited,
    #[error("Server error (HTTP {status})")]
    Server { status: u16 },
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Malformed response: {0}")]
    Decode(String),
    #[error("Job failed: {0}")]
    JobFailed(String),
    #[error("Settings error: {0}")]
    Settings(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Short text suitable for a transient notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::PayloadTooLarge => "File too large. Maximum size: 100MB".to_string(),
            Self::RateLimited => "Too many attempts. Try again in a few minutes.".to_string(),
            Self::Server { .. } => "Server error. Try again later.".to_string(),
            Self::SessionNotFound(_) => "Session not found or expired".to_string(),
            Self::Http { status, .. } => format!("Request failed (HTTP {})", status),
            Self::Network(_) => "Cannot reach the server. Check your connection.".to_string(),
            Self::Decode(_) => "Unexpected response from the server".to_string(),
            Self::JobFailed(msg) => format!("Error: {}", msg),
            Self::Settings(msg) => format!("Settings error: {}", msg),
            Self::Io(e) => format!("File error: {}", e),
        }
    }

    /// Errors that never reached the backend.
    pub fn is_client_side(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Io(_) | Self::Settings(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
