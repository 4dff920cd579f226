//! Shelflife realtime notification library.
//!
//! Provides the per-user WebSocket registry used to push notifications to
//! every live connection of a user, plus the HTTP surface that authenticates
//! and upgrades those connections.

pub mod api;
pub mod auth;
pub mod ws;
