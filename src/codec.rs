use anyhow::{anyhow, Result};
use tokio_util::{
    bytes::{Buf as _, BufMut as _, BytesMut},
    codec::{Decoder, Encoder},
};

use crate::endpoint::{Endpoint, ENDPOINT_TOKEN_LEN};
use crate::message::{JoinPayload, Message, MessagePayload, MessageType, RemoteRecord, UpdatePayload};

/// Wire size of a join payload: 6-byte endpoint token + 8-byte heartbeat.
pub(crate) const JOIN_PAYLOAD_LEN: usize = ENDPOINT_TOKEN_LEN + 8;

/// Wire size of one membership record: 6-byte endpoint token + 8-byte
/// heartbeat + 8-byte timestamp.
pub(crate) const RECORD_LEN: usize = ENDPOINT_TOKEN_LEN + 8 + 8;

/// Bit-exact message codec.
///
/// Datagram framing: one message per buffer, `[1-byte type tag][payload]`.
/// Join payloads are fixed 14 bytes; an UPDATE payload is a run of 22-byte
/// records whose count is inferred from the remaining buffer length. All
/// multi-byte integers are big-endian.
pub(crate) struct MessageCodec;

impl MessageCodec {
    pub(crate) fn new() -> Self {
        MessageCodec
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(item.msg_type as u8);

        match &item.payload {
            MessagePayload::JoinRequest(join) | MessagePayload::JoinReply(join) => {
                dst.extend_from_slice(&join.sender.encode());
                dst.put_u64(join.heartbeat);
            }
            MessagePayload::Update(update) => {
                for record in &update.records {
                    dst.extend_from_slice(&record.endpoint.encode());
                    dst.put_u64(record.heartbeat);
                    dst.put_u64(record.timestamp);
                }
            }
        }

        Ok(())
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let message_type = MessageType::from_u8(src.get_u8())?;

        let payload = match message_type {
            MessageType::JoinRequest => MessagePayload::JoinRequest(Self::decode_join(src)?),
            MessageType::JoinReply => MessagePayload::JoinReply(Self::decode_join(src)?),
            MessageType::Update => MessagePayload::Update(Self::decode_update(src)?),
        };

        Ok(Some(Message {
            msg_type: message_type,
            payload,
        }))
    }
}

impl MessageCodec {
    /// read a fixed number of bytes
    pub(crate) fn read_bytes(src: &mut BytesMut, size: usize) -> Result<BytesMut> {
        if src.remaining() < size {
            return Err(anyhow!("Buffer underflow: not enough data"));
        }
        Ok(src.split_to(size))
    }

    /// decode a 6-byte endpoint token
    pub(crate) fn read_endpoint(src: &mut BytesMut) -> Result<Endpoint> {
        let bytes = Self::read_bytes(src, ENDPOINT_TOKEN_LEN)?;
        Ok(Endpoint::decode(<[u8; ENDPOINT_TOKEN_LEN]>::try_from(&bytes[..])?))
    }

    fn decode_join(src: &mut BytesMut) -> Result<JoinPayload> {
        if src.remaining() != JOIN_PAYLOAD_LEN {
            return Err(anyhow!(
                "Invalid join payload length: expected {}, got {}",
                JOIN_PAYLOAD_LEN,
                src.remaining()
            ));
        }
        let sender = Self::read_endpoint(src)?;
        let heartbeat = src.get_u64();
        Ok(JoinPayload { sender, heartbeat })
    }

    fn decode_update(src: &mut BytesMut) -> Result<UpdatePayload> {
        if src.remaining() % RECORD_LEN != 0 {
            return Err(anyhow!(
                "Invalid update payload length: {} is not a multiple of {}",
                src.remaining(),
                RECORD_LEN
            ));
        }

        let count = src.remaining() / RECORD_LEN;
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let endpoint = Self::read_endpoint(src)?;
            let heartbeat = src.get_u64();
            let timestamp = src.get_u64();
            records.push(RemoteRecord {
                endpoint,
                heartbeat,
                timestamp,
            });
        }

        Ok(UpdatePayload { records })
    }
}
