use thiserror::Error;

use super::auth::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("OCI returned HTTP {status} ({code}): {message} (opc-request-id: {request_id})")]
    Service {
        status: u16,
        code: String,
        message: String,
        request_id: String,
    },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Request signing failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Response is missing the {0} header")]
    MissingHeader(&'static str),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Service { status, .. } => Some(*status),
            ApiError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// The OCI error code (`NotAuthorizedOrNotFound`, `IncorrectState`, ...)
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(status: u16, code: &str) -> ApiError {
        ApiError::Service {
            status,
            code: code.to_string(),
            message: "message".to_string(),
            request_id: "req-1".to_string(),
        }
    }

    #[test]
    fn not_found_is_detected_from_status() {
        assert!(service(404, "NotAuthorizedOrNotFound").is_not_found());
        assert!(!service(409, "IncorrectState").is_not_found());
        assert!(!ApiError::Parse("x".into()).is_not_found());
    }

    #[test]
    fn service_error_formatting() {
        let error = service(409, "IncorrectState");
        assert_eq!(error.code(), Some("IncorrectState"));
        let text = error.to_string();
        assert!(text.contains("HTTP 409"));
        assert!(text.contains("IncorrectState"));
        assert!(text.contains("req-1"));
    }
}
