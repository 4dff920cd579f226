//! HTTP API module.
//!
//! Liveness, the realtime upgrade endpoint, and dev-only helpers.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::DevNotifyResponse;
pub use routes::create_router;
pub use state::AppState;
