use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No credential available for an authenticated request")]
    MissingCredential,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RemoteError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut cut = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => RemoteError::Unauthorized,
            403 => RemoteError::AccessDenied(truncated),
            404 => RemoteError::NotFound(truncated),
            429 => RemoteError::RateLimited,
            500..=599 => RemoteError::ServerError(truncated),
            _ => RemoteError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether the failure came from the transport rather than the server.
    pub fn is_offline(&self) -> bool {
        matches!(self, RemoteError::Network(e) if e.is_connect() || e.is_timeout())
    }
}
