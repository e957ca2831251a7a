// Membership protocol message and message type.
use anyhow::{anyhow, Result};
use tokio_util::{bytes::BytesMut, codec::Decoder};
use core::fmt;

use crate::codec::MessageCodec;
use crate::endpoint::Endpoint;

/// Payload carried by both join messages: who is asking (or answering)
/// and its current heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPayload {
    pub sender: Endpoint,
    pub heartbeat: u64,
}

/// One membership-table row as it appears on the wire.
///
/// The `timestamp` is the sender's local stamp; receivers never adopt it
/// and re-stamp merged rows with their own clock, since clocks across
/// nodes are not assumed synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteRecord {
    pub endpoint: Endpoint,
    pub heartbeat: u64,
    pub timestamp: u64,
}

/// Full-table snapshot pushed each gossip round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePayload {
    pub records: Vec<RemoteRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    JoinRequest(JoinPayload),
    JoinReply(JoinPayload),
    Update(UpdatePayload),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub(crate) msg_type: MessageType,
    pub(crate) payload: MessagePayload,
}

impl Message {
    pub(crate) fn join_request(sender: Endpoint, heartbeat: u64) -> Self {
        Self {
            msg_type: MessageType::JoinRequest,
            payload: MessagePayload::JoinRequest(JoinPayload { sender, heartbeat }),
        }
    }

    pub(crate) fn join_reply(sender: Endpoint, heartbeat: u64) -> Self {
        Self {
            msg_type: MessageType::JoinReply,
            payload: MessagePayload::JoinReply(JoinPayload { sender, heartbeat }),
        }
    }

    pub(crate) fn update(records: Vec<RemoteRecord>) -> Self {
        Self {
            msg_type: MessageType::Update,
            payload: MessagePayload::Update(UpdatePayload { records }),
        }
    }

    pub(crate) fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut codec = MessageCodec::new();
        let mut bytes = BytesMut::from(data);
        codec
            .decode(&mut bytes)?
            .ok_or_else(|| anyhow!("unable to decode message"))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    JoinRequest = 0,
    JoinReply = 1,
    Update = 2,
}

impl MessageType {
    pub(crate) fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageType::JoinRequest),
            1 => Ok(MessageType::JoinReply),
            2 => Ok(MessageType::Update),
            _ => Err(anyhow!("Invalid MessageType value: {}", value)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::JoinRequest => write!(f, "JOIN_REQUEST"),
            MessageType::JoinReply => write!(f, "JOIN_REPLY"),
            MessageType::Update => write!(f, "UPDATE"),
        }
    }
}
