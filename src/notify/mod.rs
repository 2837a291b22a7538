//! `Notifier` — the abstract delivery port from `spec.md` §4.2.
//!
//! Grounded in the teacher's `InMemoryMessageCoordinator`
//! (`server.rs`): a `conn_id -> mpsc::Sender` registry mutated only by the
//! transport layer, with best-effort `try_send` delivery that never blocks
//! the engine on a slow or dead client.

pub mod memory;

use async_trait::async_trait;

use crate::domain::ConnId;

pub use memory::InMemoryNotifier;

/// Delivers JSON payloads to connected clients. Sends to unknown/detached
/// connections are silent no-ops — clients tolerate gaps and can resync via
/// `GameService::get_turn_snapshot` on reconnect (`spec.md` §7).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_to_conn(&self, conn_id: &str, payload: serde_json::Value);
    async fn broadcast(&self, conn_ids: &[ConnId], payload: serde_json::Value);
    async fn close_conn(&self, conn_id: &str);
}
