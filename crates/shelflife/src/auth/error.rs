//! Authentication errors.

use thiserror::Error;

/// Authentication errors.
///
/// Every variant is a rejected credential; the HTTP layer answers all of
/// them with 401.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token in the query string or Authorization header.
    #[error("missing token")]
    MissingToken,

    /// Invalid authorization header format.
    #[error("invalid authorization header format")]
    InvalidAuthHeader,

    /// Invalid token.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token expired.
    #[error("token expired")]
    TokenExpired,

    /// Token is valid but carries no subject.
    #[error("token has no subject")]
    MissingSubject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        let err = AuthError::MissingToken;
        assert_eq!(err.to_string(), "missing token");

        let err = AuthError::InvalidToken("bad".to_string());
        assert_eq!(err.to_string(), "invalid token: bad");

        assert_eq!(AuthError::MissingSubject.to_string(), "token has no subject");
    }
}
