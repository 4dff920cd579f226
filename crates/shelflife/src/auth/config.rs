//! Authentication configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable the JWT secret is read from by default.
pub const DEFAULT_JWT_SECRET_REF: &str = "env:SUPABASE_JWT_SECRET";

/// Minimum accepted length of a resolved JWT secret.
const MIN_SECRET_LEN: usize = 32;

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Accept `dev:<user>` tokens and mount the dev notify endpoint.
    pub dev_mode: bool,

    /// HS256 secret, or `env:VAR_NAME` to read it from the environment.
    /// REQUIRED when dev_mode is false.
    pub jwt_secret: Option<String>,

    /// Expected `aud` claim. Not checked when unset.
    pub audience: Option<String>,

    /// Origins allowed to open realtime connections. Empty allows any.
    pub allowed_origins: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            jwt_secret: Some(DEFAULT_JWT_SECRET_REF.to_string()),
            audience: None,
            allowed_origins: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// Resolve the JWT secret, expanding `env:VAR_NAME` syntax.
    /// Returns the resolved secret or None if not configured.
    pub fn resolve_jwt_secret(&self) -> Result<Option<String>, ConfigValidationError> {
        let Some(value) = &self.jwt_secret else {
            return Ok(None);
        };

        match value.strip_prefix("env:") {
            Some(var_name) => match std::env::var(var_name) {
                Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
                Ok(_) => Err(ConfigValidationError::EnvVarEmpty(var_name.to_string())),
                Err(_) => Err(ConfigValidationError::EnvVarNotFound(var_name.to_string())),
            },
            None if value.is_empty() => Ok(None),
            None => Ok(Some(value.clone())),
        }
    }

    /// Validate the configuration.
    /// Returns an error if the configuration is invalid for the current mode.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.dev_mode {
            return Ok(());
        }

        let secret = self
            .resolve_jwt_secret()?
            .ok_or(ConfigValidationError::MissingJwtSecret)?;

        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigValidationError::JwtSecretTooShort);
        }

        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    /// JWT secret is required in production mode.
    #[error(
        "JWT secret is required when dev_mode is false. Set SUPABASE_JWT_SECRET or auth.jwt_secret in config."
    )]
    MissingJwtSecret,

    /// JWT secret is shorter than the minimum length.
    #[error("JWT secret must be at least 32 characters long.")]
    JwtSecretTooShort,

    /// Environment variable not found (for `env:VAR_NAME` syntax).
    #[error("Environment variable '{0}' not found (referenced via env:{0} in config).")]
    EnvVarNotFound(String),

    /// Environment variable is empty (for `env:VAR_NAME` syntax).
    #[error("Environment variable '{0}' is empty (referenced via env:{0} in config).")]
    EnvVarEmpty(String),
}
