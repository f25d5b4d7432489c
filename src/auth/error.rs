use thiserror::Error;

/// Failures of the OAuth2 authorization and token flows.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization was not granted: {0}")]
    Denied(String),

    #[error("Timed out after {0}s waiting for the browser redirect")]
    RedirectTimeout(u64),

    #[error("Cannot listen for the redirect on 127.0.0.1:{port}: {source}")]
    Listener { port: u16, source: std::io::Error },

    #[error("Token endpoint returned HTTP {status}: {error}")]
    TokenEndpoint { status: u16, error: String },

    #[error("Unexpected token response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    /// The grant itself was rejected (revoked or expired refresh token,
    /// reused code), as opposed to a transport failure.
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, AuthError::TokenEndpoint { error, .. } if error == "invalid_grant")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_grant_detected() {
        let e = AuthError::TokenEndpoint {
            status: 400,
            error: "invalid_grant".into(),
        };
        assert!(e.is_invalid_grant());
    }

    #[test]
    fn test_other_token_errors_not_invalid_grant() {
        let e = AuthError::TokenEndpoint {
            status: 401,
            error: "invalid_client".into(),
        };
        assert!(!e.is_invalid_grant());
        assert!(!AuthError::RedirectTimeout(5).is_invalid_grant());
    }
}
