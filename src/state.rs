use std::fmt;

/// Lifecycle phase of a node's membership engine.
///
/// A node moves strictly forward: `Uninitialized` until its table is set
/// up, `Initialized` once bootstrapped locally, `AwaitingJoinReply` while
/// its join request is in flight, and `Joined` once it participates in
/// gossip. `Failed` models a simulated crash and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodePhase {
    Uninitialized,
    Initialized,
    AwaitingJoinReply,
    Joined,
    Failed,
}

impl NodePhase {
    /// Whether the node participates in gossip rounds.
    pub(crate) fn is_joined(&self) -> bool {
        matches!(self, NodePhase::Joined)
    }

    /// Whether the node still processes inbound messages.
    pub(crate) fn is_live(&self) -> bool {
        !matches!(self, NodePhase::Failed)
    }

    /// Whether the node is waiting on the coordinator's reply.
    pub(crate) fn is_awaiting_join_reply(&self) -> bool {
        matches!(self, NodePhase::AwaitingJoinReply)
    }
}

impl Default for NodePhase {
    fn default() -> Self {
        NodePhase::Uninitialized
    }
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodePhase::Uninitialized => write!(f, "Uninitialized"),
            NodePhase::Initialized => write!(f, "Initialized"),
            NodePhase::AwaitingJoinReply => write!(f, "AwaitingJoinReply"),
            NodePhase::Joined => write!(f, "Joined"),
            NodePhase::Failed => write!(f, "Failed"),
        }
    }
}
