//! Registry of live realtime connections keyed by user.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use log::{debug, info, warn};
use serde::Serialize;

use super::client::{Client, ClientId, EnqueueError, Payload};

type Registry = HashMap<String, HashMap<ClientId, Weak<Client>>>;

/// Routes payloads to every live connection of a user.
///
/// The hub only indexes connections; each [`Client`] is kept alive by its
/// own connection tasks. Registration and removal take the write lock,
/// fan-out takes the read lock and never waits on a full queue.
#[derive(Debug, Default)]
pub struct Hub {
    /// User ID -> connections of that user. A key exists only while its set
    /// is non-empty.
    clients: RwLock<Registry>,

    /// Payloads dropped because a connection's queue was full.
    dropped: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its user.
    pub fn add(&self, client: &Arc<Client>) {
        let mut clients = self.write();
        let conns = clients.entry(client.user_id().to_string()).or_default();
        conns.insert(client.id(), Arc::downgrade(client));
        info!(
            "Registered realtime connection {} for user {} ({} active)",
            client.id(),
            client.user_id(),
            conns.len()
        );
    }

    /// Unregister a connection and close its outbound queue.
    ///
    /// Safe to call more than once; only the first call closes the queue.
    /// Returns whether this call did the closing.
    pub fn remove(&self, client: &Client) -> bool {
        let closed = {
            let mut clients = self.write();
            if let Some(conns) = clients.get_mut(client.user_id()) {
                conns.remove(&client.id());
                if conns.is_empty() {
                    clients.remove(client.user_id());
                }
            }
            client.close()
        };

        if closed {
            info!(
                "Unregistered realtime connection {} for user {}",
                client.id(),
                client.user_id()
            );
        } else {
            debug!(
                "Realtime connection {} for user {} was already removed",
                client.id(),
                client.user_id()
            );
        }
        closed
    }

    /// Queue `payload` on every connection of `user_id`.
    ///
    /// Never blocks and never fails: a connection whose queue is full misses
    /// this payload (counted in [`Hub::dropped_messages`]), and a user with
    /// no connections is ignored.
    pub fn send_to_user(&self, user_id: &str, payload: impl Into<Payload>) {
        let payload = payload.into();
        let clients = self.read();
        let Some(conns) = clients.get(user_id) else {
            return;
        };

        for (client_id, client) in conns {
            let Some(client) = client.upgrade() else {
                continue;
            };
            match client.try_enqueue(payload.clone()) {
                Ok(()) => {}
                Err(EnqueueError::Full) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Dropping message for user {} connection {} (queue full)",
                        user_id, client_id
                    );
                }
                Err(EnqueueError::Closed) => {
                    debug!(
                        "Skipping closed connection {} for user {}",
                        client_id, user_id
                    );
                }
            }
        }
    }

    /// Serialize `value` as JSON and fan it out with [`Hub::send_to_user`].
    pub fn send_json<T: Serialize>(&self, user_id: &str, value: &T) -> serde_json::Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.send_to_user(user_id, payload);
        Ok(())
    }

    /// Remove every connection of `user_id`. Their writers flush what is
    /// already queued and then close the socket.
    ///
    /// Returns the number of queues this call closed.
    pub fn disconnect_user(&self, user_id: &str) -> usize {
        let (removed, closed) = {
            let mut clients = self.write();
            let removed = clients.remove(user_id).unwrap_or_default();
            let closed = removed
                .values()
                .filter_map(Weak::upgrade)
                .filter(|client| client.close())
                .count();
            (removed.len(), closed)
        };

        if removed > 0 {
            info!(
                "Disconnected {} realtime connection(s) for user {}",
                removed, user_id
            );
        }
        closed
    }

    /// Whether `client` is currently registered.
    pub fn contains(&self, client: &Client) -> bool {
        self.read()
            .get(client.user_id())
            .is_some_and(|conns| conns.contains_key(&client.id()))
    }

    /// Number of live connections for a user.
    pub fn connection_count(&self, user_id: &str) -> usize {
        self.read().get(user_id).map(HashMap::len).unwrap_or(0)
    }

    /// Number of users with at least one connection.
    pub fn connected_user_count(&self) -> usize {
        self.read().len()
    }

    /// Number of connections across all users.
    pub fn total_connections(&self) -> usize {
        self.read().values().map(HashMap::len).sum()
    }

    /// Payloads dropped so far because of full queues.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.clients.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.clients.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn ping() -> Bytes {
        Bytes::from_static(br#"{"type":"ping"}"#)
    }

    #[test]
    fn test_hub_creation() {
        let hub = Hub::new();
        assert_eq!(hub.total_connections(), 0);
        assert_eq!(hub.connected_user_count(), 0);
        assert_eq!(hub.dropped_messages(), 0);
    }

    #[test]
    fn test_add_client() {
        let hub = Hub::new();
        let (client, _outbound) = Client::new("u1");

        hub.add(&client);

        assert!(hub.contains(&client));
        assert_eq!(hub.connection_count("u1"), 1);
        assert_eq!(hub.connected_user_count(), 1);
    }

    #[test]
    fn test_multiple_connections_same_user() {
        let hub = Hub::new();
        let clients: Vec<_> = (0..3).map(|_| Client::new("u1")).collect();
        for (client, _) in &clients {
            hub.add(client);
        }

        assert_eq!(hub.connection_count("u1"), 3);
        assert_eq!(hub.total_connections(), 3);
        assert_eq!(hub.connected_user_count(), 1);
    }

    #[test]
    fn test_send_to_user_enqueues() {
        let hub = Hub::new();
        let (client, mut outbound) = Client::new("u1");
        hub.add(&client);

        hub.send_to_user("u1", ping());

        assert_eq!(outbound.try_next(), Some(ping()));
        assert_eq!(outbound.try_next(), None);
    }

    #[test]
    fn test_send_to_user_fans_out() {
        let hub = Hub::new();
        let (c1, mut o1) = Client::new("u1");
        let (c2, mut o2) = Client::new("u1");
        hub.add(&c1);
        hub.add(&c2);

        hub.send_to_user("u1", ping());

        assert_eq!(o1.try_next(), Some(ping()));
        assert_eq!(o2.try_next(), Some(ping()));
    }

    #[test]
    fn test_send_to_user_targets_only_that_user() {
        let hub = Hub::new();
        let (a, mut oa) = Client::new("u1");
        let (b, mut ob) = Client::new("u2");
        hub.add(&a);
        hub.add(&b);

        hub.send_to_user("u2", ping());

        assert_eq!(oa.try_next(), None);
        assert_eq!(ob.try_next(), Some(ping()));
    }

    #[test]
    fn test_send_to_unknown_user_is_noop() {
        let hub = Hub::new();
        hub.send_to_user("nobody", ping());
        assert_eq!(hub.connected_user_count(), 0);
        assert_eq!(hub.dropped_messages(), 0);
    }

    #[test]
    fn test_overflow_drops_and_counts() {
        let hub = Hub::new();
        let (client, mut outbound) = Client::new("u1");
        hub.add(&client);

        for i in 0..17 {
            hub.send_to_user("u1", format!(r#"{{"n":{i}}}"#));
        }

        assert_eq!(hub.dropped_messages(), 1);
        let mut received = 0;
        while let Some(payload) = outbound.try_next() {
            // Drop-newest: the first 16 survive in order.
            assert_eq!(payload, Bytes::from(format!(r#"{{"n":{received}}}"#)));
            received += 1;
        }
        assert_eq!(received, 16);
    }

    #[test]
    fn test_overflow_only_affects_full_client() {
        let hub = Hub::new();
        let (slow, _slow_outbound) = Client::new("u1");
        let (fast, mut fast_outbound) = Client::new("u1");
        hub.add(&slow);
        hub.add(&fast);

        for _ in 0..16 {
            slow.try_enqueue(ping()).unwrap();
        }
        hub.send_to_user("u1", ping());

        assert_eq!(hub.dropped_messages(), 1);
        assert_eq!(fast_outbound.try_next(), Some(ping()));
    }

    #[test]
    fn test_remove_client() {
        let hub = Hub::new();
        let (client, mut outbound) = Client::new("u1");
        hub.add(&client);

        assert!(hub.remove(&client));

        assert!(!hub.contains(&client));
        assert_eq!(hub.connection_count("u1"), 0);
        assert_eq!(hub.connected_user_count(), 0);
        assert!(client.is_closed());

        hub.send_to_user("u1", ping());
        assert_eq!(outbound.try_next(), None);
    }

    #[test]
    fn test_remove_twice_is_noop() {
        let hub = Hub::new();
        let (client, _outbound) = Client::new("u1");
        hub.add(&client);

        assert!(hub.remove(&client));
        assert!(!hub.remove(&client));
        assert_eq!(hub.total_connections(), 0);
    }

    #[test]
    fn test_remove_keeps_other_connections() {
        let hub = Hub::new();
        let (c1, _o1) = Client::new("u1");
        let (c2, mut o2) = Client::new("u1");
        hub.add(&c1);
        hub.add(&c2);

        hub.remove(&c1);

        assert_eq!(hub.connection_count("u1"), 1);
        hub.send_to_user("u1", ping());
        assert_eq!(o2.try_next(), Some(ping()));
    }

    #[test]
    fn test_dropped_client_is_skipped() {
        let hub = Hub::new();
        let (client, _outbound) = Client::new("u1");
        hub.add(&client);
        drop(client);

        hub.send_to_user("u1", ping());
        assert_eq!(hub.dropped_messages(), 0);
    }

    #[test]
    fn test_disconnect_user() {
        let hub = Hub::new();
        let (c1, _o1) = Client::new("u1");
        let (c2, _o2) = Client::new("u1");
        let (other, _o3) = Client::new("u2");
        hub.add(&c1);
        hub.add(&c2);
        hub.add(&other);

        assert_eq!(hub.disconnect_user("u1"), 2);

        assert!(c1.is_closed());
        assert!(c2.is_closed());
        assert!(!other.is_closed());
        assert_eq!(hub.connected_user_count(), 1);

        // The reader-side cleanup that follows is a no-op.
        assert!(!hub.remove(&c1));
        assert_eq!(hub.disconnect_user("u1"), 0);
    }

    #[test]
    fn test_send_json() {
        let hub = Hub::new();
        let (client, mut outbound) = Client::new("u1");
        hub.add(&client);

        hub.send_json("u1", &json!({"type": "ping"})).unwrap();

        assert_eq!(outbound.try_next(), Some(ping()));
    }

    #[tokio::test]
    async fn test_concurrent_send_and_remove() {
        let hub = Arc::new(Hub::new());
        let mut outbounds = Vec::new();
        let mut clients = Vec::new();
        for _ in 0..8 {
            let (client, outbound) = Client::new("u1");
            hub.add(&client);
            clients.push(client);
            outbounds.push(outbound);
        }

        let sender = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    hub.send_to_user("u1", ping());
                    tokio::task::yield_now().await;
                }
            })
        };
        let remover = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for client in clients {
                    hub.remove(&client);
                    tokio::task::yield_now().await;
                }
            })
        };

        sender.await.unwrap();
        remover.await.unwrap();

        assert_eq!(hub.connected_user_count(), 0);
        for mut outbound in outbounds {
            let mut n = 0;
            while outbound.next().await.is_some() {
                n += 1;
            }
            assert!(n <= 16);
        }
    }
}
