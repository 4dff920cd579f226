//! Authentication module.
//!
//! Resolves the user behind a realtime connection request:
//! - HS256 JWT validation (Supabase access tokens in production)
//! - `dev:<user>` bypass tokens when dev mode is enabled
//! - Origin allow-listing for browser upgrades

mod claims;
mod config;
mod error;
mod validator;

pub use claims::Claims;
pub use config::{AuthConfig, ConfigValidationError};
pub use error::AuthError;
pub use validator::{AuthState, TokenValidator, bearer_token_from_header};
