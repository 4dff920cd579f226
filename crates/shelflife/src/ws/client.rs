//! One live realtime connection and its writer/reader tasks.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::debug;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use super::hub::Hub;

/// Capacity of each connection's outbound queue.
pub const CLIENT_QUEUE_CAPACITY: usize = 16;

/// An opaque outbound message. JSON text in practice.
pub type Payload = Bytes;

/// Unique identifier for a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a payload could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at capacity; the payload was dropped.
    Full,
    /// The client has been removed; nothing will be written anymore.
    Closed,
}

/// A registered realtime connection.
///
/// Holds the sending half of the connection's bounded queue. The queue is
/// closed by taking the sender out of its slot, which only [`Hub::remove`]
/// does, so the first removal closes it and any later one is a no-op.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    user_id: String,
    outbound: Mutex<Option<mpsc::Sender<Payload>>>,
}

impl Client {
    /// Create a client for `user_id` with a fresh queue of
    /// [`CLIENT_QUEUE_CAPACITY`] slots.
    pub fn new(user_id: impl Into<String>) -> (Arc<Self>, Outbound) {
        Self::with_capacity(user_id, CLIENT_QUEUE_CAPACITY)
    }

    pub(crate) fn with_capacity(user_id: impl Into<String>, capacity: usize) -> (Arc<Self>, Outbound) {
        let (tx, rx) = mpsc::channel(capacity);
        let client = Arc::new(Self {
            id: ClientId::new(),
            user_id: user_id.into(),
            outbound: Mutex::new(Some(tx)),
        });
        let outbound = Outbound {
            client_id: client.id,
            user_id: client.user_id.clone(),
            rx,
        };
        (client, outbound)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Queue a payload without waiting.
    pub fn try_enqueue(&self, payload: Payload) -> Result<(), EnqueueError> {
        let slot = self.slot();
        let Some(tx) = slot.as_ref() else {
            return Err(EnqueueError::Closed);
        };
        tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Whether the outbound queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.slot().is_none()
    }

    /// Close the outbound queue. Returns `true` only for the call that
    /// actually closed it.
    pub(crate) fn close(&self) -> bool {
        self.slot().take().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<Payload>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiving half of a client's queue, owned by the writer task.
#[derive(Debug)]
pub struct Outbound {
    client_id: ClientId,
    user_id: String,
    rx: mpsc::Receiver<Payload>,
}

impl Outbound {
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Wait for the next payload. Returns `None` once the queue is closed
    /// and every buffered payload has been taken.
    pub async fn next(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    /// Take a buffered payload if one is ready.
    pub fn try_next(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }
}

/// Drain `outbound` into `sink`, one frame per payload.
///
/// Stops on the first write error. Once the queue is closed the remaining
/// payloads are written before the sink is closed.
pub async fn run_writer<S>(mut sink: S, mut outbound: Outbound)
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    while let Some(payload) = outbound.next().await {
        if let Err(e) = sink.send(frame(payload)).await {
            debug!(
                "Write to connection {} of user {} failed: {}",
                outbound.client_id, outbound.user_id, e
            );
            break;
        }
    }

    if let Err(e) = sink.close().await {
        debug!(
            "Closing connection {} of user {} failed: {}",
            outbound.client_id, outbound.user_id, e
        );
    }
}

/// Read and discard frames until the peer goes away, then remove `client`
/// from `hub`.
pub async fn run_reader<St, E>(mut stream: St, hub: &Hub, client: &Client)
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => {
                debug!(
                    "Connection {} of user {} sent close",
                    client.id(),
                    client.user_id()
                );
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(
                    "Read from connection {} of user {} failed: {}",
                    client.id(),
                    client.user_id(),
                    e
                );
                break;
            }
        }
    }

    hub.remove(client);
}

fn frame(payload: Payload) -> Message {
    match String::from_utf8(payload.to_vec()) {
        Ok(text) => Message::Text(text.into()),
        Err(_) => Message::Binary(payload),
    }
}
