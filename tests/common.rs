#![allow(dead_code)]

use hserve::frame::{FrameHeader, FRAME_HEADER_SIZE};
use hserve::{Config, Connection, ConnectionId, Error, Outcome, Registry};
use hserve::{CaptureStatus, DataStatus, HandlerError, MethodSet, RequestCtx, ResponseCtx};
use http::Method;
use std::sync::{Arc, Mutex, Once};

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Client SETTINGS: max concurrent streams 100, initial window 65535.
pub const SETTINGS: &[u8] = &[
    0x00, 0x00, 0x0c, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x03, 0x00, 0x00, 0x00, 0x64, 0x00, 0x04, 0x00, 0x00, 0xff, 0xff,
];

pub const SETTINGS_ACK: &[u8] = &[0x00, 0x00, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00];

pub const GOAWAY: &[u8] = &[
    0x00, 0x00, 0x08, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

pub const STREAM_1: u32 = 3;
pub const STREAM_2: u32 = 5;

/// HEADERS from a real client: GET / on stream 3 (END_STREAM | END_HEADERS).
pub const HEADERS_GET_ROOT: &[u8] = &[
    0x00, 0x00, 0x21, 0x01, 0x05, 0x00, 0x00, 0x00, 0x03, //
    0x82, 0x84, 0x86, 0x41, 0x8a, 0x0b, 0xe2, 0x5c, 0x0b, 0x89, 0x70, 0xdc, //
    0x78, 0x0f, 0x03, 0x53, 0x03, 0x2a, 0x2f, 0x2a, 0x90, 0x7a, 0x8a, 0xaa, //
    0x69, 0xd2, 0x9a, 0xc4, 0xc0, 0x57, 0x68, 0x0b, 0x83,
];

/// HEADERS from a real client: GET /index.html on stream 5.
pub const HEADERS_GET_INDEX: &[u8] = &[
    0x00, 0x00, 0x21, 0x01, 0x05, 0x00, 0x00, 0x00, 0x05, //
    0x82, 0x85, 0x86, 0x41, 0x8a, 0x0b, 0xe2, 0x5c, 0x0b, 0x89, 0x70, 0xdc, //
    0x78, 0x0f, 0x03, 0x53, 0x03, 0x2a, 0x2f, 0x2a, 0x90, 0x7a, 0x8a, 0xaa, //
    0x69, 0xd2, 0x9a, 0xc4, 0xc0, 0x57, 0x68, 0x0b, 0x83,
];

/// GET /dynamic on stream 3.
pub const HEADERS_GET_DYNAMIC: &[u8] = &[
    0x00, 0x00, 0x2b, 0x01, 0x05, 0x00, 0x00, 0x00, 0x03, //
    0x82, 0x86, 0x41, 0x87, 0x0b, 0xe2, 0x5c, 0x0b, 0x89, 0x70, 0xff, 0x04, //
    0x86, 0x62, 0x4f, 0x55, 0x0e, 0x93, 0x13, 0x7a, 0x88, 0x25, 0xb6, 0x50, //
    0xc3, 0xcb, 0xbc, 0xb8, 0x3f, 0x53, 0x03, 0x2a, 0x2f, 0x2a, 0x5f, 0x87, //
    0x49, 0x7c, 0xa5, 0x8a, 0xe8, 0x19, 0xaa,
];

/// GET /dynamic on stream 3 with 17 bytes of padding.
pub const HEADERS_GET_DYNAMIC_PADDED: &[u8] = &[
    0x00, 0x00, 0x3d, 0x01, 0x0d, 0x00, 0x00, 0x00, 0x03, 0x11, //
    0x82, 0x86, 0x41, 0x87, 0x0b, 0xe2, 0x5c, 0x0b, 0x89, 0x70, 0xff, 0x04, //
    0x86, 0x62, 0x4f, 0x55, 0x0e, 0x93, 0x13, 0x7a, 0x88, 0x25, 0xb6, 0x50, //
    0xc3, 0xcb, 0xbc, 0xb8, 0x3f, 0x53, 0x03, 0x2a, 0x2f, 0x2a, 0x5f, 0x87, //
    0x49, 0x7c, 0xa5, 0x8a, 0xe8, 0x19, 0xaa, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00,
];

/// POST /dynamic on stream 3, content-length 17, END_HEADERS only.
pub const HEADERS_POST_DYNAMIC: &[u8] = &[
    0x00, 0x00, 0x30, 0x01, 0x04, 0x00, 0x00, 0x00, 0x03, //
    0x83, 0x86, 0x41, 0x87, 0x0b, 0xe2, 0x5c, 0x0b, 0x89, 0x70, 0xff, 0x04, //
    0x86, 0x62, 0x4f, 0x55, 0x0e, 0x93, 0x13, 0x7a, 0x88, 0x25, 0xb6, 0x50, //
    0xc3, 0xcb, 0xbc, 0xb8, 0x3f, 0x53, 0x03, 0x2a, 0x2f, 0x2a, 0x5f, 0x87, //
    0x49, 0x7c, 0xa5, 0x8a, 0xe8, 0x19, 0xaa, 0x0f, 0x0d, 0x02, 0x31, 0x37,
];

/// As `HEADERS_POST_DYNAMIC` with priority fields.
pub const HEADERS_POST_DYNAMIC_PRIORITY: &[u8] = &[
    0x00, 0x00, 0x35, 0x01, 0x24, 0x00, 0x00, 0x00, 0x03, //
    0x00, 0x00, 0x00, 0x00, 0x64, //
    0x83, 0x86, 0x41, 0x87, 0x0b, 0xe2, 0x5c, 0x0b, 0x89, 0x70, 0xff, 0x04, //
    0x86, 0x62, 0x4f, 0x55, 0x0e, 0x93, 0x13, 0x7a, 0x88, 0x25, 0xb6, 0x50, //
    0xc3, 0xcb, 0xbc, 0xb8, 0x3f, 0x53, 0x03, 0x2a, 0x2f, 0x2a, 0x5f, 0x87, //
    0x49, 0x7c, 0xa5, 0x8a, 0xe8, 0x19, 0xaa, 0x0f, 0x0d, 0x02, 0x31, 0x37,
];

/// As `HEADERS_POST_DYNAMIC` with priority fields and 10 bytes of padding.
pub const HEADERS_POST_DYNAMIC_PRIORITY_PADDED: &[u8] = &[
    0x00, 0x00, 0x40, 0x01, 0x2c, 0x00, 0x00, 0x00, 0x03, //
    0x0a, 0x00, 0x00, 0x00, 0x00, 0xc8, //
    0x83, 0x86, 0x41, 0x87, 0x0b, 0xe2, 0x5c, 0x0b, 0x89, 0x70, 0xff, 0x04, //
    0x86, 0x62, 0x4f, 0x55, 0x0e, 0x93, 0x13, 0x7a, 0x88, 0x25, 0xb6, 0x50, //
    0xc3, 0xcb, 0xbc, 0xb8, 0x3f, 0x53, 0x03, 0x2a, 0x2f, 0x2a, 0x5f, 0x87, //
    0x49, 0x7c, 0xa5, 0x8a, 0xe8, 0x19, 0xaa, 0x0f, 0x0d, 0x02, 0x31, 0x37, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// First part of the POST /dynamic header block, no END_HEADERS. The split falls inside a
/// header field.
pub const PARTIAL_HEADERS_POST_DYNAMIC: &[u8] = &[
    0x00, 0x00, 0x20, 0x01, 0x00, 0x00, 0x00, 0x00, 0x03, //
    0x83, 0x86, 0x41, 0x87, 0x0b, 0xe2, 0x5c, 0x0b, 0x89, 0x70, 0xff, 0x04, //
    0x86, 0x62, 0x4f, 0x55, 0x0e, 0x93, 0x13, 0x7a, 0x88, 0x25, 0xb6, 0x50, //
    0xc3, 0xcb, 0xbc, 0xb8, 0x3f, 0x53, 0x03, 0x2a,
];

pub const CONTINUATION_POST_DYNAMIC: &[u8] = &[
    0x00, 0x00, 0x10, 0x09, 0x04, 0x00, 0x00, 0x00, 0x03, //
    0x2f, 0x2a, 0x5f, 0x87, 0x49, 0x7c, 0xa5, 0x8a, 0xe8, 0x19, 0xaa, 0x0f, //
    0x0d, 0x02, 0x31, 0x37,
];

/// "Test dynamic POST" with END_STREAM on stream 3.
pub const DATA_POST_DYNAMIC: &[u8] = &[
    0x00, 0x00, 0x11, 0x00, 0x01, 0x00, 0x00, 0x00, 0x03, //
    0x54, 0x65, 0x73, 0x74, 0x20, 0x64, 0x79, 0x6e, 0x61, 0x6d, 0x69, 0x63, //
    0x20, 0x50, 0x4f, 0x53, 0x54,
];

/// "Test dynamic POST" with 34 bytes of padding, END_STREAM on stream 3.
pub const DATA_POST_DYNAMIC_PADDED: &[u8] = &[
    0x00, 0x00, 0x34, 0x00, 0x09, 0x00, 0x00, 0x00, 0x03, 0x22, //
    0x54, 0x65, 0x73, 0x74, 0x20, 0x64, 0x79, 0x6e, 0x61, 0x6d, 0x69, 0x63, //
    0x20, 0x50, 0x4f, 0x53, 0x54, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// "Test dynamic POST" without END_STREAM on stream 3.
pub const DATA_POST_DYNAMIC_NO_END_STREAM: &[u8] = &[
    0x00, 0x00, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, //
    0x54, 0x65, 0x73, 0x74, 0x20, 0x64, 0x79, 0x6e, 0x61, 0x6d, 0x69, 0x63, //
    0x20, 0x50, 0x4f, 0x53, 0x54,
];

/// Trailer block (`test-header: test_value`) ending stream 3.
pub const TRAILING_HEADER: &[u8] = &[
    0x00, 0x00, 0x0c, 0x01, 0x05, 0x00, 0x00, 0x00, 0x03, //
    0x40, 0x84, 0x92, 0xda, 0x69, 0xf5, 0x85, 0x9c, 0xa3, 0x90, 0xb6, 0x7f,
];

pub const RST_STREAM_1: &[u8] = &[
    0x00, 0x00, 0x04, 0x03, 0x00, 0x00, 0x00, 0x00, 0x03, //
    0xaa, 0xaa, 0xaa, 0xaa,
];

/// DELETE /dynamic on stream 3 (END_STREAM).
pub const HEADERS_DELETE_DYNAMIC: &[u8] = &[
    0x00, 0x00, 0x32, 0x01, 0x05, 0x00, 0x00, 0x00, 0x03, //
    0x42, 0x06, 0x44, 0x45, 0x4c, 0x45, 0x54, 0x45, 0x86, 0x41, 0x87, 0x0b, //
    0xe2, 0x5c, 0x0b, 0x89, 0x70, 0xff, 0x04, 0x86, 0x62, 0x4f, 0x55, 0x0e, //
    0x93, 0x13, 0x7a, 0x88, 0x25, 0xb6, 0x50, 0xc3, 0xcb, 0xbc, 0xb8, 0x3f, //
    0x53, 0x03, 0x2a, 0x2f, 0x2a, 0x5f, 0x87, 0x49, 0x7c, 0xa5, 0x8a, 0xe8, //
    0x19, 0xaa,
];

pub const STATIC_PAYLOAD: &[u8] = b"Hello, World!";
pub const DYNAMIC_GET_PAYLOAD: &[u8] = b"Test dynamic GET";
pub const DYNAMIC_POST_PAYLOAD: &[u8] = b"Test dynamic POST";

pub fn setup_logger() {
    static START: Once = Once::new();
    START.call_once(|| {
        let test_log = std::env::var("TEST_LOG")
            .map(|x| x != "0" && x.to_lowercase() != "false")
            .unwrap_or(false);
        let level = if test_log {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Info
        };
        pretty_env_logger::formatted_builder()
            .filter_level(log::LevelFilter::Warn)
            .filter_module("hserve", level)
            .target(env_logger::Target::Stdout)
            .init();
    });
}

/// What the echo resource saw.
#[derive(Debug, Default)]
pub struct Seen {
    pub body: Vec<u8>,
    pub calls: Vec<DataStatus>,
    pub headers: Vec<(String, String)>,
    pub capture: Option<CaptureStatus>,
    pub queries: Vec<String>,
}

/// Registry like the one most tests use: "/" static, "/dynamic" answering GET with a fixed
/// body and collecting what POST/PUT/PATCH send.
pub fn registry() -> (Registry, Arc<Mutex<Seen>>) {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let mut reg = Registry::new();

    reg.add_static("/", STATIC_PAYLOAD, "text/html");

    let seen2 = seen.clone();
    reg.add_dynamic(
        "/dynamic",
        MethodSet::of(&[
            Method::GET,
            Method::DELETE,
            Method::POST,
            Method::PUT,
            Method::PATCH,
        ]),
        "text/plain",
        move |status: DataStatus, req: &RequestCtx<'_>| -> Result<ResponseCtx, HandlerError> {
            let mut seen = seen2.lock().unwrap();
            seen.calls.push(status);
            seen.headers = req
                .headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect();
            seen.capture = Some(req.headers.status());

            if status == DataStatus::Aborted {
                return Ok(ResponseCtx::new());
            }

            if *req.method == Method::GET {
                let query = String::from_utf8_lossy(req.data).to_string();
                seen.queries.push(query);
                return Ok(ResponseCtx::new()
                    .with_body(DYNAMIC_GET_PAYLOAD)
                    .finished());
            }
            if *req.method == Method::DELETE {
                return Ok(ResponseCtx::new().finished());
            }

            seen.body.extend_from_slice(req.data);
            Ok(ResponseCtx::new())
        },
    );

    (reg, seen)
}

pub fn connection() -> Connection {
    connection_with(Config::default())
}

pub fn connection_with(config: Config) -> Connection {
    setup_logger();
    Connection::new(ConnectionId(1), Arc::new(config))
}

/// Feed `input` and collect the output.
pub fn feed(
    conn: &mut Connection,
    reg: &mut Registry,
    input: &[u8],
) -> (Result<Outcome, Error>, Vec<u8>) {
    let res = conn.feed(reg, input);
    (res, conn.take_output())
}

/// Concatenate byte slices.
pub fn cat(parts: &[&[u8]]) -> Vec<u8> {
    parts.iter().flat_map(|p| p.iter().copied()).collect()
}

/// Build a frame.
pub fn frame(kind: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut v = vec![];
    let len = (payload.len() as u32).to_be_bytes();
    v.extend_from_slice(&len[1..]);
    v.push(kind);
    v.push(flags);
    v.extend_from_slice(&stream_id.to_be_bytes());
    v.extend_from_slice(payload);
    v
}

/// A frame as read back from server output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn kind(&self) -> u8 {
        self.header.frame_type
    }

    pub fn stream_id(&self) -> u32 {
        self.header.stream_id
    }

    pub fn flags(&self) -> u8 {
        self.header.flags
    }
}

/// Split server output into frames. Panics on trailing garbage.
pub fn frames(mut bytes: &[u8]) -> Vec<Frame> {
    let mut v = vec![];
    while !bytes.is_empty() {
        let header = FrameHeader::parse(bytes).expect("frame header");
        let end = FRAME_HEADER_SIZE + header.length as usize;
        assert!(bytes.len() >= end, "truncated frame: {:?}", header);
        v.push(Frame {
            header,
            payload: bytes[FRAME_HEADER_SIZE..end].to_vec(),
        });
        bytes = &bytes[end..];
    }
    v
}

/// Client side header compression, one per connection.
pub struct ClientHpack {
    encoder: loona_hpack::Encoder<'static>,
    decoder: loona_hpack::Decoder<'static>,
}

impl ClientHpack {
    pub fn new() -> Self {
        ClientHpack {
            encoder: loona_hpack::Encoder::new(),
            decoder: loona_hpack::Decoder::new(),
        }
    }

    pub fn encode(&mut self, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut out = vec![];
        self.encoder
            .encode_into(
                fields.iter().map(|(n, v)| (n.as_bytes(), v.as_bytes())),
                &mut out,
            )
            .unwrap();
        out
    }

    /// Decode a response header block.
    pub fn decode(&mut self, block: &[u8]) -> Vec<(String, String)> {
        let mut v = vec![];
        self.decoder
            .decode_with_cb(block, |n, val| {
                v.push((
                    String::from_utf8_lossy(&n).to_string(),
                    String::from_utf8_lossy(&val).to_string(),
                ))
            })
            .unwrap();
        v
    }
}

pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Get through preface and settings exchange, checking the server's side of it.
pub fn h2_start(conn: &mut Connection, reg: &mut Registry) {
    let (res, out) = feed(conn, reg, &cat(&[PREFACE, SETTINGS]));
    assert_eq!(res.unwrap(), Outcome::NeedMore);

    let f = frames(&out);
    assert_eq!(f.len(), 2);
    assert_eq!(f[0].kind(), 0x4);
    assert_eq!(f[0].flags(), 0);
    assert_eq!(f[0].stream_id(), 0);
    assert_eq!(f[1].kind(), 0x4);
    assert_eq!(f[1].flags(), 0x1);
    assert!(f[1].payload.is_empty());
}
