//! HTTP/2 frame header codec and frame writers.
//!
//! Only the 9-byte header is parsed here. Payloads stay in the receive buffer and are read
//! in place by the connection, one state per frame type.

/// Size of an HTTP/2 frame header.
pub const FRAME_HEADER_SIZE: usize = 9;

/// The client connection preface that starts every HTTP/2 connection.
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Mask for the 31 bit stream identifier, the high bit is reserved.
pub const STREAM_ID_MASK: u32 = 0x7fff_ffff;

/// Largest frame length that fits in the 24 bit length field.
pub const MAX_FRAME_LENGTH: u32 = 0x00ff_ffff;

/// Size of one SETTINGS parameter (16 bit id, 32 bit value).
pub const SETTINGS_FIELD_SIZE: usize = 6;

/// HTTP/2 frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

impl FrameType {
    /// Try to convert a byte to a frame type.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Priority),
            0x3 => Some(FrameType::RstStream),
            0x4 => Some(FrameType::Settings),
            0x5 => Some(FrameType::PushPromise),
            0x6 => Some(FrameType::Ping),
            0x7 => Some(FrameType::GoAway),
            0x8 => Some(FrameType::WindowUpdate),
            0x9 => Some(FrameType::Continuation),
            _ => None,
        }
    }

    /// Name as used in RFC 7540, for logging.
    pub fn name(self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::GoAway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
        }
    }
}

/// Frame flags.
pub mod flags {
    /// DATA/HEADERS: last frame the peer sends on this stream.
    pub const END_STREAM: u8 = 0x1;
    /// SETTINGS/PING: acknowledgment.
    pub const ACK: u8 = 0x1;
    /// HEADERS/CONTINUATION: the header block is complete.
    pub const END_HEADERS: u8 = 0x4;
    /// DATA/HEADERS: a padding length byte leads the payload.
    pub const PADDED: u8 = 0x8;
    /// HEADERS: 5 bytes of priority information precede the header block.
    pub const PRIORITY: u8 = 0x20;
}

/// SETTINGS parameter identifiers.
#[allow(missing_docs)]
pub mod settings {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// Raw frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length (24 bits).
    pub length: u32,
    /// Frame type, possibly one we don't know.
    pub frame_type: u8,
    /// Frame flags.
    pub flags: u8,
    /// Stream identifier with the reserved bit masked off.
    pub stream_id: u32,
}

impl FrameHeader {
    /// Header for a frame we send. The reserved bit of `stream_id` is cleared.
    pub fn new(frame_type: FrameType, flags: u8, stream_id: u32, length: u32) -> Self {
        FrameHeader {
            length,
            frame_type: frame_type as u8,
            flags,
            stream_id: stream_id & STREAM_ID_MASK,
        }
    }

    /// Parse a frame header from the start of `buf`. `None` until 9 bytes are available.
    pub fn parse(buf: &[u8]) -> Option<FrameHeader> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }
        let length = u32::from_be_bytes([0, buf[0], buf[1], buf[2]]);
        let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & STREAM_ID_MASK;
        Some(FrameHeader {
            length,
            frame_type: buf[3],
            flags: buf[4],
            stream_id,
        })
    }

    /// The 9 bytes on the wire.
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let len = self.length.to_be_bytes();
        let id = (self.stream_id & STREAM_ID_MASK).to_be_bytes();
        [
            len[1],
            len[2],
            len[3],
            self.frame_type,
            self.flags,
            id[0],
            id[1],
            id[2],
            id[3],
        ]
    }

    /// The frame type as an enum, if known.
    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }

    /// Whether `flag` is set.
    #[inline]
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Type name for logging, `UNKNOWN` for types we don't handle.
    pub fn type_name(&self) -> &'static str {
        self.kind().map(FrameType::name).unwrap_or("UNKNOWN")
    }
}

fn write_header(out: &mut Vec<u8>, kind: FrameType, flags: u8, stream_id: u32, length: usize) {
    let header = FrameHeader::new(kind, flags, stream_id, length as u32);
    trace!(
        "Send {} stream: {} len: {} flags: {:#x}",
        kind.name(),
        stream_id,
        length,
        flags
    );
    out.extend_from_slice(&header.encode());
}

/// Append a SETTINGS frame carrying `params`.
pub fn write_settings(out: &mut Vec<u8>, params: &[(u16, u32)]) {
    write_header(
        out,
        FrameType::Settings,
        0,
        0,
        params.len() * SETTINGS_FIELD_SIZE,
    );
    for (id, value) in params {
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&value.to_be_bytes());
    }
}

/// Append a SETTINGS frame acknowledging the peer's.
pub fn write_settings_ack(out: &mut Vec<u8>) {
    write_header(out, FrameType::Settings, flags::ACK, 0, 0);
}

/// Append a WINDOW_UPDATE frame. Stream 0 is the connection window.
pub fn write_window_update(out: &mut Vec<u8>, stream_id: u32, increment: u32) {
    write_header(out, FrameType::WindowUpdate, 0, stream_id, 4);
    out.extend_from_slice(&(increment & STREAM_ID_MASK).to_be_bytes());
}

/// Append a HEADERS frame. The whole block goes out in one frame, END_HEADERS is always set.
pub fn write_headers(out: &mut Vec<u8>, stream_id: u32, block: &[u8], end_stream: bool) {
    let mut f = flags::END_HEADERS;
    if end_stream {
        f |= flags::END_STREAM;
    }
    write_header(out, FrameType::Headers, f, stream_id, block.len());
    out.extend_from_slice(block);
}

/// Append `data` as DATA frames no bigger than `max_frame`. Only the last frame
/// carries END_STREAM. Empty data still produces one (empty) frame.
pub fn write_data(
    out: &mut Vec<u8>,
    stream_id: u32,
    data: &[u8],
    end_stream: bool,
    max_frame: usize,
) {
    let max_frame = max_frame.max(1);
    let mut chunks = data.chunks(max_frame).peekable();

    if chunks.peek().is_none() {
        let f = if end_stream { flags::END_STREAM } else { 0 };
        write_header(out, FrameType::Data, f, stream_id, 0);
        return;
    }

    while let Some(chunk) = chunks.next() {
        let last = chunks.peek().is_none();
        let f = if last && end_stream {
            flags::END_STREAM
        } else {
            0
        };
        write_header(out, FrameType::Data, f, stream_id, chunk.len());
        out.extend_from_slice(chunk);
    }
}

/// Append a PING ACK echoing the peer's opaque data.
pub fn write_ping_ack(out: &mut Vec<u8>, opaque: &[u8]) {
    write_header(out, FrameType::Ping, flags::ACK, 0, opaque.len());
    out.extend_from_slice(opaque);
}
