use std::error::Error;
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::endpoint::Endpoint;

/// A membership change as observed by one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterEvent {
    /// `observer` added `member` to its table.
    MemberAdded {
        observer: Endpoint,
        member: Endpoint,
    },
    /// `observer` expired `member` out of its table.
    MemberRemoved {
        observer: Endpoint,
        member: Endpoint,
    },
}

/// [`ClusterEventHandler`] is notified of membership table changes.
///
/// Handlers are invoked synchronously at the moment of table mutation,
/// on the observing node's tick path: when a peer is first added (via a
/// join or a merged update) and when failure expiry removes one.
#[async_trait]
pub trait ClusterEventHandler: Send + Sync {
    /// Notifies the handler that `observer` has added `member` to its
    /// membership view.
    async fn notify_join(
        &self,
        observer: Endpoint,
        member: Endpoint,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Notifies the handler that `observer` has removed `member` from its
    /// membership view after the failure timeout.
    async fn notify_remove(
        &self,
        observer: Endpoint,
        member: Endpoint,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Event handler that records every notification in order. Useful for
/// tests and for embedders that want to audit membership churn.
#[derive(Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<ClusterEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ClusterEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl ClusterEventHandler for MemoryEventLog {
    async fn notify_join(
        &self,
        observer: Endpoint,
        member: Endpoint,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.events
            .lock()
            .push(ClusterEvent::MemberAdded { observer, member });
        Ok(())
    }

    async fn notify_remove(
        &self,
        observer: Endpoint,
        member: Endpoint,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.events
            .lock()
            .push(ClusterEvent::MemberRemoved { observer, member });
        Ok(())
    }
}
