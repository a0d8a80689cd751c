//! Per-connection engine: receive buffer, top level state and the drive loop.
//!
//! A [`Connection`] knows nothing about sockets. It is fed whatever bytes the transport
//! delivered and leaves the bytes to send in an output buffer. See [`server::serve`] for an
//! async driver over a `futures-io` transport.
//!
//! [`server::serve`]: ../server/fn.serve.html

use crate::buffer::RecvBuf;
use crate::config::Config;
use crate::frame::{self, settings, CONNECTION_PREFACE};
use crate::http11::Http1;
use crate::http2::{FrameState, Http2};
use crate::resource::{ConnectionId, Registry};
use crate::Error;
use std::sync::Arc;
use std::time::Instant;

/// What the caller should do after [`Connection::feed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Send the output and come back with more input.
    NeedMore,
    /// Send the output, then close the transport.
    Close,
    /// Send the output, then hand the transport to whoever took the upgrade (WebSocket).
    /// Bytes already received past the handshake are in [`Connection::take_unprocessed`].
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    /// Deciding between HTTP/2 (client preface) and HTTP/1.1.
    Preface,
    Http1,
    Http2(FrameState),
    Done,
    Detached,
}

/// Result of one state handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    NeedMore,
}

/// One accepted connection.
///
/// ```
/// use hserve::{Config, Connection, ConnectionId, Outcome, Registry};
/// use std::sync::Arc;
///
/// let mut registry = Registry::new();
/// registry.add_static("/", "Hello, World!", "text/html");
///
/// let mut conn = Connection::new(ConnectionId(1), Arc::new(Config::default()));
/// let outcome = conn.feed(&mut registry, b"GET / HTTP/1.1\r\n\r\n").unwrap();
///
/// assert_eq!(outcome, Outcome::NeedMore);
/// assert_eq!(
///     conn.take_output(),
///     b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 13\r\n\r\nHello, World!"
/// );
/// ```
#[derive(Debug)]
pub struct Connection {
    pub(crate) id: ConnectionId,
    pub(crate) config: Arc<Config>,
    pub(crate) buf: RecvBuf,
    pub(crate) out: Vec<u8>,
    pub(crate) state: State,
    /// Our SETTINGS went out.
    settings_sent: bool,
    /// Came to HTTP/2 through an h2c upgrade.
    pub(crate) upgraded: bool,
    pub(crate) h1: Http1,
    pub(crate) h2: Http2,
    /// Input that arrived after the connection was detached.
    leftover: Vec<u8>,
    last_activity: Instant,
}

impl Connection {
    /// Create the engine for a newly accepted connection. Whether it speaks HTTP/1.1 or
    /// HTTP/2 is decided by the first bytes fed to it.
    pub fn new(id: ConnectionId, config: Arc<Config>) -> Self {
        Connection {
            id,
            buf: RecvBuf::with_capacity(config.recv_buffer_size),
            out: Vec::with_capacity(config.recv_buffer_size),
            state: State::Preface,
            settings_sent: false,
            upgraded: false,
            h1: Http1::new(&config),
            h2: Http2::new(&config),
            leftover: vec![],
            last_activity: Instant::now(),
            config,
        }
    }

    /// Id given in [`new`](Connection::new).
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether HTTP/2 is spoken on this connection.
    pub fn is_http2(&self) -> bool {
        matches!(self.state, State::Http2(_))
    }

    /// Number of HTTP/2 streams currently open.
    pub fn open_streams(&self) -> usize {
        self.h2.active_streams()
    }

    /// Process newly received bytes. Responses end up in the output, see
    /// [`take_output`](Connection::take_output).
    ///
    /// Any error is fatal, the connection must be closed. Held resources are released before
    /// this returns, in that case as well as on [`Outcome::Close`].
    pub fn feed(&mut self, registry: &mut Registry, mut input: &[u8]) -> Result<Outcome, Error> {
        match self.state {
            State::Done => return Ok(Outcome::Close),
            State::Detached => {
                self.leftover.extend_from_slice(input);
                return Ok(Outcome::Detached);
            }
            _ => {}
        }

        self.last_activity = Instant::now();

        loop {
            let amount = self.buf.fill(input);
            input = &input[amount..];

            let outcome = match self.drive(registry) {
                Ok(v) => v,
                Err(e) => {
                    debug!("Connection {:?} failed: {}", self.id, e);
                    self.abort(registry);
                    return Err(e);
                }
            };

            match outcome {
                Outcome::NeedMore => {}
                Outcome::Close => {
                    self.abort(registry);
                    return Ok(Outcome::Close);
                }
                Outcome::Detached => {
                    self.leftover.extend_from_slice(input);
                    return Ok(Outcome::Detached);
                }
            }

            self.buf.compact();

            if self.buf.is_full() {
                self.abort(registry);
                return Err(Error::exhausted(format!(
                    "Request does not fit the {} byte receive buffer",
                    self.config.recv_buffer_size
                )));
            }

            if input.is_empty() {
                return Ok(Outcome::NeedMore);
            }
        }
    }

    fn drive(&mut self, registry: &mut Registry) -> Result<Outcome, Error> {
        loop {
            trace!("drive_state: {:?}", self.state);

            let step = match self.state {
                State::Preface => self.on_preface()?,
                State::Http1 => self.on_http1(registry)?,
                State::Http2(fs) => self.on_frame_state(fs, registry)?,
                State::Done => return Ok(Outcome::Close),
                State::Detached => return Ok(Outcome::Detached),
            };

            if step == Step::NeedMore {
                return Ok(Outcome::NeedMore);
            }
        }
    }

    fn on_preface(&mut self) -> Result<Step, Error> {
        let amount = self.buf.len().min(CONNECTION_PREFACE.len());

        if self.buf[..amount] != CONNECTION_PREFACE[..amount] {
            if self.upgraded {
                return Err(Error::protocol("Missing client preface after h2c upgrade"));
            }
            trace!("No client preface, HTTP/1.1");
            self.state = State::Http1;
            return Ok(Step::Continue);
        }

        if amount < CONNECTION_PREFACE.len() {
            return Ok(Step::NeedMore);
        }

        self.buf.consume(amount);
        debug!("HTTP/2 client preface on {:?}", self.id);

        self.send_settings();
        self.state = State::Http2(FrameState::Header);

        Ok(Step::Continue)
    }

    /// Our SETTINGS, once per connection.
    pub(crate) fn send_settings(&mut self) {
        if self.settings_sent {
            return;
        }
        frame::write_settings(
            &mut self.out,
            &[
                (settings::MAX_CONCURRENT_STREAMS, self.config.max_streams),
                (settings::INITIAL_WINDOW_SIZE, self.config.initial_window_size),
            ],
        );
        self.settings_sent = true;
    }

    /// Bytes to send to the peer. Leaves the output empty.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }

    /// Received bytes that were not processed, after a detach.
    pub fn take_unprocessed(&mut self) -> Vec<u8> {
        let mut rest = self.buf.take();
        rest.append(&mut self.leftover);
        rest
    }

    /// Drop the connection: every held resource is told and released, open streams are
    /// closed. Further input is ignored.
    pub fn abort(&mut self, registry: &mut Registry) {
        let id = self.id;

        self.h1.exchange.abort(registry, id, 0);

        let streams = self.h2.streams_mut();
        let open: Vec<u32> = streams.active_mut().map(|s| s.id).collect();
        for stream in streams.active_mut() {
            let stream_id = stream.id;
            stream.exchange.abort(registry, id, stream_id);
        }
        for stream_id in open {
            streams.release(stream_id);
        }

        if self.state != State::Detached {
            self.state = State::Done;
        }
    }

    /// Note activity on the connection, resetting the inactivity timer.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Whether the connection went without activity for longer than the inactivity timeout.
    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_activity) >= self.config.inactivity_timeout
    }

    /// Time left until the inactivity timeout.
    pub fn time_left(&self, now: Instant) -> std::time::Duration {
        self.config
            .inactivity_timeout
            .checked_sub(now.saturating_duration_since(self.last_activity))
            .unwrap_or_default()
    }
}
