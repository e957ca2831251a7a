use std::collections::HashMap;
use std::sync::Arc;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::endpoint::Endpoint;

/// Fire-and-forget message transport between addressable endpoints.
///
/// Delivery carries no acknowledgment and no backpressure signal back to
/// the engine; a successful return only means the message was handed to
/// the network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_to(&self, src: Endpoint, dst: Endpoint, data: &[u8]) -> Result<()>;
}

/// In-memory transport hub for simulated topologies.
///
/// Each registered endpoint gets an exclusive FIFO inbox; sends to an
/// unregistered or failed endpoint succeed and are dropped, matching a
/// lossy network where peers may keep sending to a dead node.
#[derive(Clone, Default)]
pub struct SimNetwork {
    inboxes: Arc<Mutex<HashMap<Endpoint, mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint and hands back its inbox receiver. The
    /// receiver is the endpoint's exclusive delivery queue.
    pub fn register(&self, endpoint: Endpoint) -> Result<mpsc::UnboundedReceiver<Vec<u8>>> {
        let mut inboxes = self.inboxes.lock();
        if inboxes.contains_key(&endpoint) {
            return Err(anyhow!("endpoint {} is already registered", endpoint));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inboxes.insert(endpoint, tx);
        Ok(rx)
    }

    /// Simulates a crash: the endpoint stops receiving, permanently.
    /// In-flight and future sends to it vanish.
    pub fn fail(&self, endpoint: Endpoint) {
        self.inboxes.lock().remove(&endpoint);
    }

    pub fn is_registered(&self, endpoint: Endpoint) -> bool {
        self.inboxes.lock().contains_key(&endpoint)
    }
}

#[async_trait]
impl Transport for SimNetwork {
    async fn send_to(&self, src: Endpoint, dst: Endpoint, data: &[u8]) -> Result<()> {
        let sender = self.inboxes.lock().get(&dst).cloned();
        match sender {
            Some(tx) => {
                // a dropped receiver means the node shut down mid-send
                if tx.send(data.to_vec()).is_err() {
                    trace!(%src, %dst, "inbox closed, dropping message");
                }
            }
            None => {
                trace!(%src, %dst, "no such endpoint, dropping message");
            }
        }
        Ok(())
    }
}
