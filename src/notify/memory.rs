use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::ConnId;

use super::Notifier;

/// Per-connection outbound channel. The receiving half lives in the
/// transport layer's websocket write loop, which forwards each `Value` as a
/// JSON text frame and treats channel closure as "close this socket".
pub type ConnSender = mpsc::Sender<serde_json::Value>;

/// In-memory `Notifier`: a registry mutated only by the transport adapter
/// (`register`/`unregister`), matching `spec.md` §5's "`Notifier` maintains
/// a `conn_id -> socket` map mutated only by the transport adapter".
#[derive(Default)]
pub struct InMemoryNotifier {
    conns: RwLock<HashMap<ConnId, ConnSender>>,
}

impl InMemoryNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly-attached connection's outbound channel. Called by
    /// the transport layer when a websocket upgrades.
    pub fn register(&self, conn_id: &str, sender: ConnSender) {
        self.conns
            .write()
            .expect("notifier lock poisoned")
            .insert(conn_id.to_string(), sender);
    }

    /// Detach a connection (on disconnect). Dropping the sender causes the
    /// transport layer's write loop to observe channel closure and tear
    /// down the socket.
    pub fn unregister(&self, conn_id: &str) {
        self.conns.write().expect("notifier lock poisoned").remove(conn_id);
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send_to_conn(&self, conn_id: &str, payload: serde_json::Value) {
        let sender = self
            .conns
            .read()
            .expect("notifier lock poisoned")
            .get(conn_id)
            .cloned();
        if let Some(sender) = sender {
            if sender.try_send(payload).is_err() {
                tracing::warn!(conn_id, "dropped message to slow/dead connection");
            }
        }
    }

    async fn broadcast(&self, conn_ids: &[ConnId], payload: serde_json::Value) {
        for conn_id in conn_ids {
            self.send_to_conn(conn_id, payload.clone()).await;
        }
    }

    async fn close_conn(&self, conn_id: &str) {
        self.unregister(conn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_to_unknown_conn_is_a_silent_noop() {
        let notifier = InMemoryNotifier::new();
        notifier.send_to_conn("ghost", serde_json::json!({"type": "ping"})).await;
    }

    #[tokio::test]
    async fn send_to_conn_delivers_payload() {
        let notifier = InMemoryNotifier::new();
        let (tx, mut rx) = mpsc::channel(4);
        notifier.register("conn-a", tx);
        notifier
            .send_to_conn("conn-a", serde_json::json!({"type": "welcome"}))
            .await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received["type"], "welcome");
    }

    #[tokio::test]
    async fn broadcast_skips_unknown_recipients() {
        let notifier = InMemoryNotifier::new();
        let (tx, mut rx) = mpsc::channel(4);
        notifier.register("conn-a", tx);
        notifier
            .broadcast(
                &["conn-a".to_string(), "conn-ghost".to_string()],
                serde_json::json!({"type": "user_left"}),
            )
            .await;
        assert!(rx.recv().await.is_some());
    }
}
