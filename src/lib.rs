#![warn(missing_docs, missing_debug_implementations)]
#![warn(clippy::all)]

//! An embeddable HTTP/1.1 and HTTP/2 request engine.
//!
//! The engine answers requests from a [`Registry`] of resources over one connection at a
//! time, without knowing anything about sockets: a [`Connection`] is fed received bytes and
//! produces the bytes to send. Both the receive buffer and the HTTP/2 stream table have a
//! fixed capacity set in [`Config`]; a request that doesn't fit is an error, never a reason to
//! grow.
//!
//! ## In scope
//!
//! * HTTP/1.1 with keep-alive, `Content-Length` and chunked request bodies, chunked responses
//!   from dynamic resources.
//! * HTTP/2 with prior knowledge, or upgraded from HTTP/1.1 (`Upgrade: h2c`). Header blocks
//!   split over CONTINUATION frames, padding, flow control window updates.
//! * The WebSocket opening handshake. The transport is handed back after it.
//! * Static resources, files (with pre-compressed siblings), dynamic resources backed by
//!   application handlers.
//!
//! ## Out of scope
//!
//! * Sockets, TLS, timers. [`server::serve`] is a small async driver over `futures-io`.
//! * WebSocket frames.
//! * HTTP/2 server push and priorities.
//!
//! # Resources
//!
//! Resources are matched by path in registration order. Dynamic resources are held by one
//! exchange (an HTTP/1.1 request or an HTTP/2 stream) at a time; a concurrent request gets
//! `409 Conflict`. The handler is invoked with every piece of request body and answers with a
//! [`ResponseCtx`]. The first answer carries status and headers, an answer with nothing set
//! ends the response.
//!
//! [`server::serve`]: server/fn.serve.html

#[macro_use]
extern crate log;

mod buffer;
mod capture;
mod compose;
mod config;
mod connection;
mod dispatch;
mod error;
mod fs;
mod hpack;
mod http11;
mod http2;
mod resource;
mod stream;

#[doc(hidden)]
pub mod frame;

pub mod server;
pub mod websocket;

pub(crate) use futures_io::{AsyncRead, AsyncWrite};

pub use capture::{CaptureStatus, HeaderCapture};
pub use config::Config;
pub use connection::{Connection, Outcome};
pub use error::Error;
pub use fs::{AcceptEncoding, Compression, FileSystem, StdFs};
pub use hpack::{HeaderCodec, Hpack};
pub use resource::{ConnectionId, DataStatus, DynamicHandler, HandlerError, HolderToken};
pub use resource::{MethodSet, Registry, RequestCtx, ResourceId, ResponseCtx, WebsocketHandler};
