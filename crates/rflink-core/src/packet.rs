//! Inbound packet parsing.
//!
//! Every line the gateway emits is a `;`-delimited record:
//!
//! ```text
//! 20;2D;NewKaku;ID=cac142;SWITCH=1;CMD=ON;
//! │  │  │       │         │        └─ command (kept verbatim)
//! │  │  │       │         └─ channel (KEY= stripped)
//! │  │  │       └─ address (KEY= stripped)
//! │  │  └─ protocol
//! │  └─ packet counter
//! └─ node type
//! ```
//!
//! Lines with five or fewer fields (startup banners, `20;01;OK;` replies,
//! partial reads) are not packets and are dropped without error.

use serde::Serialize;

/// The minimum number of `;`-separated fields a line needs to be a packet.
pub const MIN_FIELDS: usize = 6;

/// A structured view of one inbound gateway line.
///
/// All six fields are always present: lines too short to fill them are
/// rejected by [`InboundPacket::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundPacket {
    /// Node type (`20` for gateway-originated lines).
    #[serde(rename = "type")]
    pub kind: String,
    /// Rolling packet counter.
    pub id: String,
    /// RF protocol name, e.g. `NewKaku`.
    pub protocol: String,
    /// Device address with any `ID=` style prefix removed.
    pub address: String,
    /// Channel with any `SWITCH=` style prefix removed.
    pub channel: String,
    /// Command token exactly as received, e.g. `CMD=ON`.
    pub command: String,
}

impl InboundPacket {
    /// Parse one line (without its terminator) into a packet.
    ///
    /// Returns `None` for lines with five or fewer fields. Fields past the
    /// sixth are ignored.
    ///
    /// ```
    /// use rflink_core::packet::InboundPacket;
    ///
    /// let p = InboundPacket::parse("20;2D;NewKaku;ID=cac142;SWITCH=1;CMD=ON;").unwrap();
    /// assert_eq!(p.address, "cac142");
    /// assert_eq!(p.channel, "1");
    /// assert_eq!(p.command, "CMD=ON");
    ///
    /// assert!(InboundPacket::parse("20;01;OK;").is_none());
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() < MIN_FIELDS {
            return None;
        }

        Some(InboundPacket {
            kind: fields[0].to_string(),
            id: fields[1].to_string(),
            protocol: fields[2].to_string(),
            address: strip_key(fields[3]).to_string(),
            channel: strip_key(fields[4]).to_string(),
            command: fields[5].to_string(),
        })
    }
}

/// Return the value after the last `=`, or the whole field if there is none.
fn strip_key(field: &str) -> &str {
    field.rsplit_once('=').map_or(field, |(_, value)| value)
}
