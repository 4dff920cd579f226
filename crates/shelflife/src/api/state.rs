//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::{AuthState, TokenValidator};
use crate::ws::Hub;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry of live realtime connections.
    pub hub: Arc<Hub>,
    /// Auth configuration (origins, dev mode).
    pub auth: AuthState,
    /// Validator used on realtime upgrades.
    pub validator: Arc<dyn TokenValidator>,
}

impl AppState {
    /// Create state that validates tokens with `auth` itself.
    pub fn new(hub: Arc<Hub>, auth: AuthState) -> Self {
        let validator = Arc::new(auth.clone());
        Self {
            hub,
            auth,
            validator,
        }
    }

    /// Replace the token validator.
    pub fn with_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = validator;
        self
    }
}
