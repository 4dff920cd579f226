//! Token validation.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use log::{debug, warn};
use std::sync::Arc;

use super::{AuthConfig, AuthError, Claims};

/// Turns a raw credential into the user it belongs to.
pub trait TokenValidator: Send + Sync {
    /// Validate `raw` and return its subject.
    fn validate(&self, raw: &str) -> Result<String, AuthError>;
}

/// Extract a Bearer token from an Authorization header value.
pub fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::InvalidAuthHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = parts.next().ok_or(AuthError::InvalidAuthHeader)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok(token)
}

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    config: Arc<AuthConfig>,
    decoding_key: Option<DecodingKey>,
}

impl AuthState {
    /// Create new auth state from config.
    /// Resolves `env:VAR_NAME` syntax in jwt_secret at construction time.
    pub fn new(mut config: AuthConfig) -> Self {
        config.jwt_secret = match config.resolve_jwt_secret() {
            Ok(secret) => secret,
            Err(e) => {
                warn!("JWT secret unavailable: {}", e);
                None
            }
        };

        let decoding_key = config
            .jwt_secret
            .as_ref()
            .map(|s| DecodingKey::from_secret(s.as_bytes()));

        Self {
            config: Arc::new(config),
            decoding_key,
        }
    }

    /// Check if dev mode is enabled.
    pub fn is_dev_mode(&self) -> bool {
        self.config.dev_mode
    }

    /// Get allowed origins from config.
    pub fn allowed_origins(&self) -> &[String] {
        &self.config.allowed_origins
    }

    /// Whether a request with this `Origin` may open a realtime connection.
    ///
    /// An empty allow-list admits everything, and requests without an
    /// `Origin` header (non-browser clients) are always admitted.
    pub fn is_origin_allowed(&self, origin: Option<&str>) -> bool {
        let allowed = &self.config.allowed_origins;
        match origin {
            None => true,
            Some(_) if allowed.is_empty() => true,
            Some(origin) => allowed
                .iter()
                .any(|a| a == "*" || a.trim_end_matches('/') == origin.trim_end_matches('/')),
        }
    }

    /// Validate a JWT token.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        if self.config.dev_mode
            && let Some(user_id) = token.strip_prefix("dev:")
        {
            debug!("Accepting dev token for user {}", user_id);
            return Ok(Claims {
                sub: user_id.to_string(),
                iss: Some("dev".to_string()),
                iat: Some(Utc::now().timestamp()),
                ..Claims::default()
            });
        }

        // Without a secret no JWT can verify.
        let Some(decoding_key) = self.decoding_key.as_ref() else {
            warn!("Rejecting JWT: no secret configured");
            return Err(AuthError::InvalidToken("no JWT secret configured".to_string()));
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear(); // Allow missing iss/aud
        match &self.config.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<Claims>(token, decoding_key, &validation).map_err(|e| {
            warn!("JWT validation failed: {:?}", e);
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }
}

impl TokenValidator for AuthState {
    fn validate(&self, raw: &str) -> Result<String, AuthError> {
        if raw.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let claims = self.validate_token(raw)?;
        claims
            .subject()
            .map(str::to_string)
            .ok_or(AuthError::MissingSubject)
    }
}

#[cfg(test)]
#[allow(clippy::field_reassign_with_default)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};

    const SECRET: &str = "test-secret-that-is-at-least-32-chars";

    fn state(f: impl FnOnce(&mut AuthConfig)) -> AuthState {
        let mut config = AuthConfig::default();
        config.jwt_secret = Some(SECRET.to_string());
        f(&mut config);
        AuthState::new(config)
    }

    fn mint(claims: Value, secret: &str) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn in_an_hour() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_bearer_token_from_header_valid() {
        assert_eq!(
            bearer_token_from_header("Bearer abc.def.ghi").unwrap(),
            "abc.def.ghi"
        );
        assert_eq!(
            bearer_token_from_header("bearer   token123").unwrap(),
            "token123"
        );
        assert_eq!(
            bearer_token_from_header("   Bearer\tmixed-case ").unwrap(),
            "mixed-case"
        );
    }

    #[test]
    fn test_bearer_token_from_header_invalid() {
        let cases = [
            "",
            "Bearer",
            "Bearer ",
            "Token something",
            "Bearer token extra",
            "bear token",
        ];

        for case in cases {
            assert!(
                bearer_token_from_header(case).is_err(),
                "{case} should fail"
            );
        }
    }

    #[test]
    fn test_validate_returns_subject() {
        let auth = state(|_| {});
        let token = mint(json!({"sub": "u1", "exp": in_an_hour()}), SECRET);
        assert_eq!(auth.validate(&token).unwrap(), "u1");
    }

    #[test]
    fn test_validate_accepts_supabase_audience() {
        let auth = state(|_| {});
        let token = mint(
            json!({"sub": "u1", "aud": "authenticated", "role": "authenticated", "exp": in_an_hour()}),
            SECRET,
        );
        assert_eq!(auth.validate(&token).unwrap(), "u1");
    }

    #[test]
    fn test_validate_checks_configured_audience() {
        let auth = state(|c| c.audience = Some("authenticated".to_string()));
        let good = mint(json!({"sub": "u1", "aud": "authenticated", "exp": in_an_hour()}), SECRET);
        let bad = mint(json!({"sub": "u1", "aud": "anon", "exp": in_an_hour()}), SECRET);

        assert!(auth.validate(&good).is_ok());
        assert!(matches!(auth.validate(&bad), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_validate_rejects_wrong_signature() {
        let auth = state(|_| {});
        let token = mint(
            json!({"sub": "u1", "exp": in_an_hour()}),
            "another-secret-that-is-at-least-32-chars",
        );
        assert!(matches!(auth.validate(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_validate_rejects_expired() {
        let auth = state(|_| {});
        let token = mint(json!({"sub": "u1", "exp": Utc::now().timestamp() - 3600}), SECRET);
        assert!(matches!(auth.validate(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_validate_rejects_missing_subject() {
        let auth = state(|_| {});
        let token = mint(json!({"exp": in_an_hour()}), SECRET);
        assert!(matches!(auth.validate(&token), Err(AuthError::MissingSubject)));

        let token = mint(json!({"sub": "", "exp": in_an_hour()}), SECRET);
        assert!(matches!(auth.validate(&token), Err(AuthError::MissingSubject)));
    }

    #[test]
    fn test_validate_rejects_garbage_and_empty() {
        let auth = state(|_| {});
        assert!(matches!(auth.validate("not-a-jwt"), Err(AuthError::InvalidToken(_))));
        assert!(matches!(auth.validate(""), Err(AuthError::MissingToken)));
    }

    #[test]
    fn test_dev_tokens_only_in_dev_mode() {
        let prod = state(|_| {});
        assert!(prod.validate("dev:alice").is_err());

        let dev = state(|c| c.dev_mode = true);
        assert_eq!(dev.validate("dev:alice").unwrap(), "alice");
        assert!(matches!(dev.validate("dev:"), Err(AuthError::MissingSubject)));
    }

    #[test]
    fn test_no_secret_rejects_jwts() {
        let auth = state(|c| c.jwt_secret = None);
        let token = mint(json!({"sub": "u1", "exp": in_an_hour()}), SECRET);
        assert!(matches!(auth.validate(&token), Err(AuthError::InvalidToken(_))));
        assert!(matches!(auth.validate("not-a-jwt"), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_dev_mode_without_secret() {
        let auth = state(|c| {
            c.dev_mode = true;
            c.jwt_secret = None;
        });
        assert_eq!(auth.validate("dev:alice").unwrap(), "alice");
        assert!(matches!(auth.validate("not-a-jwt"), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_origin_allow_list() {
        let open = state(|_| {});
        assert!(open.is_origin_allowed(Some("https://evil.example")));
        assert!(open.is_origin_allowed(None));

        let locked = state(|c| c.allowed_origins = vec!["https://app.example.com".to_string()]);
        assert!(locked.is_origin_allowed(Some("https://app.example.com")));
        assert!(locked.is_origin_allowed(Some("https://app.example.com/")));
        assert!(!locked.is_origin_allowed(Some("https://evil.example")));
        assert!(locked.is_origin_allowed(None));
    }
}
