//! Routing packets and their wire codec.
//!
//! Wire layout:
//!
//! ```text
//! +----------------+----------------------+-------------------+
//! | u16 BE hdr len | JSON header (UTF-8)  | payload (raw)     |
//! +----------------+----------------------+-------------------+
//! ```
//!
//! The header carries `type`, `src`, `dst`, `seq`, `hops`, `ttl`, `id` and an
//! optional `path`. How the payload is read depends on `type`.

use crate::error::{RoutingError, RoutingResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric packet kind carried in the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    Data = 1,
    RouteRequest = 2,
    RouteReply = 3,
    RouteError = 4,
    Hello = 5,
    CrdtSync = 6,
}

impl PacketKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PacketKind::Data),
            2 => Some(PacketKind::RouteRequest),
            3 => Some(PacketKind::RouteReply),
            4 => Some(PacketKind::RouteError),
            5 => Some(PacketKind::Hello),
            6 => Some(PacketKind::CrdtSync),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Header fields shared by every packet kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub source: String,
    pub destination: String,
    pub seq_num: u64,
    pub hop_count: u32,
    pub ttl: u32,
    /// Random 64-bit token in hex; the de-duplication key.
    pub packet_id: String,
    /// Nodes the packet has passed through, oldest first.
    pub path_traversed: Vec<String>,
}

/// Payload of a route reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteReply {
    pub target: String,
    /// Replier's distance to the target; 0 when the replier is the target.
    pub hop_count: u32,
    pub path: Vec<String>,
}

/// Kind-specific contents of a packet.
#[derive(Clone, Debug, PartialEq)]
pub enum PacketBody {
    Data(Vec<u8>),
    RouteRequest { target: String },
    RouteReply(RouteReply),
    RouteError { broken_destination: String },
    Hello(Vec<u8>),
    CrdtSync(BTreeMap<String, serde_json::Value>),
}

impl PacketBody {
    pub fn kind(&self) -> PacketKind {
        match self {
            PacketBody::Data(_) => PacketKind::Data,
            PacketBody::RouteRequest { .. } => PacketKind::RouteRequest,
            PacketBody::RouteReply(_) => PacketKind::RouteReply,
            PacketBody::RouteError { .. } => PacketKind::RouteError,
            PacketBody::Hello(_) => PacketKind::Hello,
            PacketBody::CrdtSync(_) => PacketKind::CrdtSync,
        }
    }

    fn to_payload(&self) -> RoutingResult<Vec<u8>> {
        Ok(match self {
            PacketBody::Data(bytes) | PacketBody::Hello(bytes) => bytes.clone(),
            PacketBody::RouteRequest { target } => target.as_bytes().to_vec(),
            PacketBody::RouteReply(reply) => serde_json::to_vec(reply)?,
            PacketBody::RouteError { broken_destination } => {
                broken_destination.as_bytes().to_vec()
            }
            PacketBody::CrdtSync(map) => serde_json::to_vec(map)?,
        })
    }

    fn from_payload(kind: PacketKind, payload: &[u8]) -> RoutingResult<Self> {
        Ok(match kind {
            PacketKind::Data => PacketBody::Data(payload.to_vec()),
            PacketKind::Hello => PacketBody::Hello(payload.to_vec()),
            PacketKind::RouteRequest => PacketBody::RouteRequest {
                target: utf8(payload, "route request target")?,
            },
            PacketKind::RouteReply => PacketBody::RouteReply(
                serde_json::from_slice(payload)
                    .map_err(|e| RoutingError::Malformed(format!("route reply: {}", e)))?,
            ),
            PacketKind::RouteError => PacketBody::RouteError {
                broken_destination: utf8(payload, "route error destination")?,
            },
            PacketKind::CrdtSync => PacketBody::CrdtSync(
                serde_json::from_slice(payload)
                    .map_err(|e| RoutingError::Malformed(format!("crdt sync: {}", e)))?,
            ),
        })
    }
}

fn utf8(payload: &[u8], what: &str) -> RoutingResult<String> {
    String::from_utf8(payload.to_vec())
        .map_err(|e| RoutingError::Malformed(format!("{}: {}", what, e)))
}

/// A routing packet: shared header plus a kind-specific body.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutingPacket {
    pub header: PacketHeader,
    pub body: PacketBody,
}

#[derive(Serialize, Deserialize)]
struct WireHeader {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(rename = "src")]
    source: String,
    #[serde(rename = "dst")]
    destination: String,
    #[serde(rename = "seq")]
    seq_num: u64,
    #[serde(rename = "hops")]
    hop_count: u32,
    ttl: u32,
    #[serde(rename = "id")]
    packet_id: String,
    #[serde(rename = "path", default)]
    path_traversed: Vec<String>,
}

/// Fresh random packet id.
pub fn new_packet_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

impl RoutingPacket {
    /// A packet leaving its origin: zero hops, empty path, fresh id.
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        seq_num: u64,
        ttl: u32,
        body: PacketBody,
    ) -> Self {
        Self {
            header: PacketHeader {
                source: source.into(),
                destination: destination.into(),
                seq_num,
                hop_count: 0,
                ttl,
                packet_id: new_packet_id(),
                path_traversed: Vec::new(),
            },
            body,
        }
    }

    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.header.path_traversed = path;
        self
    }

    pub fn kind(&self) -> PacketKind {
        self.body.kind()
    }

    pub fn id(&self) -> &str {
        &self.header.packet_id
    }

    pub fn encode(&self) -> RoutingResult<Vec<u8>> {
        let h = &self.header;
        let wire = WireHeader {
            kind: self.kind().code(),
            source: h.source.clone(),
            destination: h.destination.clone(),
            seq_num: h.seq_num,
            hop_count: h.hop_count,
            ttl: h.ttl,
            packet_id: h.packet_id.clone(),
            path_traversed: h.path_traversed.clone(),
        };
        let header = serde_json::to_vec(&wire)?;
        let len = u16::try_from(header.len())
            .map_err(|_| RoutingError::HeaderTooLarge { len: header.len() })?;
        let payload = self.body.to_payload()?;

        let mut out = Vec::with_capacity(2 + header.len() + payload.len());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> RoutingResult<Self> {
        if data.len() < 2 {
            return Err(RoutingError::Malformed("missing length prefix".into()));
        }
        let len = u16::from_be_bytes([data[0], data[1]]) as usize;
        let rest = &data[2..];
        if rest.len() < len {
            return Err(RoutingError::Malformed(format!(
                "header length {} exceeds {} remaining bytes",
                len,
                rest.len()
            )));
        }
        let (header, payload) = rest.split_at(len);

        let wire: WireHeader = serde_json::from_slice(header)
            .map_err(|e| RoutingError::Malformed(format!("header: {}", e)))?;
        let kind = PacketKind::from_code(wire.kind)
            .ok_or_else(|| RoutingError::Malformed(format!("unknown packet type {}", wire.kind)))?;
        let body = PacketBody::from_payload(kind, payload)?;

        Ok(Self {
            header: PacketHeader {
                source: wire.source,
                destination: wire.destination,
                seq_num: wire.seq_num,
                hop_count: wire.hop_count,
                ttl: wire.ttl,
                packet_id: wire.packet_id,
                path_traversed: wire.path_traversed,
            },
            body,
        })
    }
}
