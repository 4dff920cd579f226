//! Realtime notification fan-out.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐        ┌──────────────────────────────┐
//! │  GET /v1/ws?token=<jwt>      │        │  Producers (settings, jobs)  │
//! │  validate -> upgrade -> add  │        │  hub.send_to_user(user, msg) │
//! └──────────────┬───────────────┘        └──────────────┬───────────────┘
//!                │                                       │ try_send (never blocks)
//! ┌──────────────▼───────────────────────────────────────▼───────────────┐
//! │                               Hub                                    │
//! │  RwLock<user_id -> { client_id -> Weak<Client> }>                    │
//! └──────────────┬───────────────────────────────────────────────────────┘
//!                │ one bounded queue (16) per connection
//! ┌──────────────▼──────────────┐     ┌─────────────────────────────────┐
//! │  writer task                │     │  reader task                    │
//! │  queue -> socket frames     │     │  discards input, detects close, │
//! │  drains then closes socket  │     │  then hub.remove(client)        │
//! └─────────────────────────────┘     └─────────────────────────────────┘
//! ```

mod client;
mod handler;
mod hub;
mod types;

pub use client::{
    CLIENT_QUEUE_CAPACITY, Client, ClientId, EnqueueError, Outbound, Payload, run_reader,
    run_writer,
};
pub use handler::{WsParams, serve_connection, ws_handler};
pub use hub::Hub;
pub use types::{Notice, NoticeKind, ServerEvent};
