//! JWT claims.

use serde::{Deserialize, Serialize};

/// JWT claims structure.
///
/// Only `sub` matters for routing; the rest is carried for logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID). Missing and empty are treated the same.
    #[serde(default)]
    pub sub: String,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Expiration time (as Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at (as Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// User's email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Supabase role (`authenticated`, `anon`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Claims {
    /// The subject, if present and non-empty. Used verbatim as the user ID.
    pub fn subject(&self) -> Option<&str> {
        if self.sub.is_empty() {
            None
        } else {
            Some(&self.sub)
        }
    }
}
