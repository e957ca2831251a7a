use std::fmt;
use std::str::FromStr;
use anyhow::{anyhow, Result};

/// Number of bytes in an encoded endpoint token.
pub const ENDPOINT_TOKEN_LEN: usize = 6;

/// Identity of a node: a numeric id plus a port.
///
/// An endpoint doubles as the transport address and as the membership-table
/// key. It encodes to a fixed 6-byte token: bytes 0..4 are the big-endian
/// id, bytes 4..6 the big-endian port. The all-zero token is reserved as
/// the null sentinel ("no address").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    pub id: u32,
    pub port: u16,
}

impl Endpoint {
    /// The reserved "no address" sentinel.
    pub const NULL: Endpoint = Endpoint { id: 0, port: 0 };

    pub fn new(id: u32, port: u16) -> Self {
        Self { id, port }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Encodes this endpoint into its 6-byte wire token.
    pub fn encode(&self) -> [u8; ENDPOINT_TOKEN_LEN] {
        let mut token = [0u8; ENDPOINT_TOKEN_LEN];
        token[..4].copy_from_slice(&self.id.to_be_bytes());
        token[4..].copy_from_slice(&self.port.to_be_bytes());
        token
    }

    /// Decodes a 6-byte wire token back into an endpoint.
    pub fn decode(token: [u8; ENDPOINT_TOKEN_LEN]) -> Self {
        let id = u32::from_be_bytes([token[0], token[1], token[2], token[3]]);
        let port = u16::from_be_bytes([token[4], token[5]]);
        Self { id, port }
    }
}

impl From<(u32, u16)> for Endpoint {
    fn from((id, port): (u32, u16)) -> Self {
        Self { id, port }
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    /// Parses the `id:port` form used in logs and test fixtures.
    fn from_str(s: &str) -> Result<Self> {
        let (id, port) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("expected id:port, got {:?}", s))?;
        Ok(Self {
            id: id.parse()?,
            port: port.parse()?,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.port)
    }
}
