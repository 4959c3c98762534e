//! RFLink line framing and command encoding.
//!
//! The gateway talks in newline-terminated ASCII lines whose fields are
//! separated by `;`. Lines it emits start with `20;`; commands sent to it
//! start with `10;`:
//!
//! ```text
//! 10;<protocol>;<address>;<channel>;ON;      switch on
//! 10;<protocol>;<address>;<channel>;OFF;     switch off
//! 10;<protocol>;<address>;<channel>;<level>; dim to a device-specific level
//! ```
//!
//! Framing here only cuts the byte stream into lines. Turning a line into a
//! packet is [`InboundPacket::parse`](rflink_core::InboundPacket::parse).

/// Byte that terminates every gateway line.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Terminator appended to formatted commands.
pub const COMMAND_TERMINATOR: &str = "\n";

/// Node number that marks a line as a command to the gateway.
pub const COMMAND_NODE: &str = "10";

/// Result of attempting to cut one line from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete line, without its `\n` or `\r\n` terminator.
    Line {
        /// The line text.
        text: String,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// A complete line that is not valid UTF-8. Drop `consumed` bytes.
    Invalid(usize),

    /// No terminator yet. More data is needed.
    Incomplete,
}

/// Cut the first complete line from `buf`.
pub fn decode_line(buf: &[u8]) -> DecodeResult {
    let term_pos = match buf.iter().position(|&b| b == LINE_TERMINATOR) {
        Some(pos) => pos,
        None => return DecodeResult::Incomplete,
    };

    let consumed = term_pos + 1;
    let body = match &buf[..term_pos] {
        [rest @ .., b'\r'] => rest,
        body => body,
    };

    match std::str::from_utf8(body) {
        Ok(text) => DecodeResult::Line {
            text: text.to_string(),
            consumed,
        },
        Err(_) => DecodeResult::Invalid(consumed),
    }
}

/// Encode a command: `10;` + fields joined by `;` + `;` + terminator.
///
/// ```
/// use rflink_io::protocol::encode_command;
///
/// assert_eq!(encode_command(&["NewKaku", "cac142", "1", "ON"]), "10;NewKaku;cac142;1;ON;\n");
/// ```
pub fn encode_command(fields: &[&str]) -> String {
    let mut cmd = String::from(COMMAND_NODE);
    for field in fields {
        cmd.push(';');
        cmd.push_str(field);
    }
    cmd.push(';');
    cmd.push_str(COMMAND_TERMINATOR);
    cmd
}

/// Build a switch command (`10;<protocol>;<address>;<channel>;ON|OFF;`).
pub fn cmd_switch(protocol: &str, address: &str, channel: &str, on: bool) -> String {
    encode_command(&[protocol, address, channel, if on { "ON" } else { "OFF" }])
}

/// Build a dim command (`10;<protocol>;<address>;<channel>;<level>;`).
pub fn cmd_dim(protocol: &str, address: &str, channel: &str, level: u32) -> String {
    encode_command(&[protocol, address, channel, &level.to_string()])
}

/// Scale a 0-100 brightness onto a device dim range, rounding half up.
/// Brightness above 100 is treated as 100.
///
/// ```
/// use rflink_io::protocol::scale_brightness;
///
/// assert_eq!(scale_brightness(50, 15), 8); // 7.5 rounds up
/// assert_eq!(scale_brightness(100, 15), 15);
/// ```
pub fn scale_brightness(brightness: u8, dim_range: u32) -> u32 {
    let scaled = (u64::from(brightness.min(100)) * u64::from(dim_range) + 50) / 100;
    // Never exceeds dim_range.
    scaled as u32
}
