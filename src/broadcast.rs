//! In-process viewer registry for live batch updates
//!
//! Maps batch id to the set of connected viewers. Broadcasts iterate a
//! snapshot of the senders so a viewer dropping mid-delivery never corrupts
//! the live set; dead senders are pruned afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

type Subscribers = HashMap<u64, UnboundedSender<serde_json::Value>>;

#[derive(Default)]
pub struct ConnectionManager {
    connections: Mutex<HashMap<i64, Subscribers>>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a viewer for a batch; messages arrive on the returned receiver
    pub fn subscribe(&self, batch_id: i64) -> (u64, UnboundedReceiver<serde_json::Value>) {
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .lock()
            .unwrap()
            .entry(batch_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    pub fn unsubscribe(&self, batch_id: i64, conn_id: u64) {
        let mut connections = self.connections.lock().unwrap();
        if let Some(subscribers) = connections.get_mut(&batch_id) {
            subscribers.remove(&conn_id);
            if subscribers.is_empty() {
                connections.remove(&batch_id);
            }
        }
    }

    /// Fire-and-forget delivery to every viewer of a batch. A failed send
    /// drops that viewer without affecting the others.
    pub fn broadcast(&self, batch_id: i64, payload: serde_json::Value) {
        let targets: Vec<(u64, UnboundedSender<serde_json::Value>)> = {
            let connections = self.connections.lock().unwrap();
            match connections.get(&batch_id) {
                Some(subscribers) => subscribers
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect(),
                None => return,
            }
        };
        let mut dead = Vec::new();
        for (conn_id, tx) in targets {
            if tx.send(payload.clone()).is_err() {
                dead.push(conn_id);
            }
        }
        for conn_id in dead {
            self.unsubscribe(batch_id, conn_id);
        }
    }

    /// Number of live viewers of a batch
    pub fn viewer_count(&self, batch_id: i64) -> usize {
        self.connections
            .lock()
            .unwrap()
            .get(&batch_id)
            .map_or(0, |subscribers| subscribers.len())
    }
}
