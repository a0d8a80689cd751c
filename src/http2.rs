//! HTTP/2 side of a connection. One state per frame type, each reading its payload straight
//! out of the receive buffer.

use crate::compose::H2Out;
use crate::config::Config;
use crate::connection::{Connection, State, Step};
use crate::dispatch::{dispatch, run_dynamic, Dispatched, RequestHead};
use crate::frame::{self, flags, FrameHeader, FrameType, FRAME_HEADER_SIZE};
use crate::hpack::{HeaderCodec, Hpack};
use crate::http11::BodyReader;
use crate::resource::{DataStatus, Registry};
use crate::stream::{StreamState, StreamTable};
use crate::Error;
use http::Method;
use std::io::Write;

/// Stream the request that asked for an h2c upgrade continues on.
const UPGRADE_STREAM_ID: u32 = 1;

/// Where in the current frame we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameState {
    Header,
    Data,
    Headers,
    Continuation,
    Settings,
    WindowUpdate,
    RstStream,
    GoAway,
    Priority,
    Ping,
    Padding,
}

/// HTTP/2 state of a connection.
pub(crate) struct Http2 {
    streams: StreamTable,
    codec: Box<dyn HeaderCodec>,
    /// Frame being read. `length` counts down the payload left to consume.
    frame: FrameHeader,
    padding: u32,
    padding_parsed: bool,
    /// Bytes of header block at the start of the buffer, spliced from HEADERS and CONTINUATION.
    block: usize,
    /// Header fields are decoded into this before the stream is known.
    scratch: RequestHead,
    /// Connection level receive window.
    window: i64,
    last_stream_id: u32,
    /// The synthetic DATA frame of an h2c upgrade is followed by the client preface.
    resume_preface: bool,
}

impl Http2 {
    pub fn new(config: &Config) -> Self {
        Http2 {
            streams: StreamTable::new(config),
            codec: Box::new(Hpack::new()),
            frame: FrameHeader::new(FrameType::Data, 0, 0, 0),
            padding: 0,
            padding_parsed: false,
            block: 0,
            scratch: RequestHead::new(config),
            window: config.initial_window_size as i64,
            last_stream_id: 0,
            resume_preface: false,
        }
    }

    pub fn active_streams(&self) -> usize {
        self.streams.active_count()
    }

    pub(crate) fn streams_mut(&mut self) -> &mut StreamTable {
        &mut self.streams
    }
}

impl std::fmt::Debug for Http2 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Http2")
            .field("frame", &self.frame)
            .field("window", &self.window)
            .field("last_stream_id", &self.last_stream_id)
            .field("streams", &self.streams.active_count())
            .finish()
    }
}

impl Connection {
    pub(crate) fn on_frame_state(
        &mut self,
        state: FrameState,
        registry: &mut Registry,
    ) -> Result<Step, Error> {
        match state {
            FrameState::Header => self.frame_header(),
            FrameState::Data => self.frame_data(registry),
            FrameState::Headers => self.frame_headers(registry),
            FrameState::Continuation => self.frame_continuation(registry),
            FrameState::Settings => self.frame_settings(),
            FrameState::WindowUpdate => self.frame_window_update(),
            FrameState::RstStream => self.frame_rst_stream(registry),
            FrameState::GoAway => self.frame_goaway(),
            FrameState::Priority => self.frame_priority(),
            FrameState::Ping => self.frame_ping(),
            FrameState::Padding => self.frame_padding(),
        }
    }

    fn frame_header(&mut self) -> Result<Step, Error> {
        let frame = match FrameHeader::parse(&self.buf) {
            Some(f) => f,
            None => return Ok(Step::NeedMore),
        };
        self.buf.consume(FRAME_HEADER_SIZE);

        trace!(
            "Recv {} stream: {} len: {} flags: {:#x}",
            frame.type_name(),
            frame.stream_id,
            frame.length,
            frame.flags
        );

        let h2 = &mut self.h2;
        h2.frame = frame;
        h2.padding = 0;
        h2.padding_parsed = false;

        let next = match frame.kind() {
            Some(FrameType::Data) => FrameState::Data,
            Some(FrameType::Headers) => FrameState::Headers,
            Some(FrameType::Priority) => FrameState::Priority,
            Some(FrameType::RstStream) => FrameState::RstStream,
            Some(FrameType::Settings) => FrameState::Settings,
            Some(FrameType::Ping) => FrameState::Ping,
            Some(FrameType::GoAway) => FrameState::GoAway,
            Some(FrameType::WindowUpdate) => FrameState::WindowUpdate,
            Some(FrameType::Continuation) => {
                return Err(Error::protocol("CONTINUATION without a header block"));
            }
            Some(FrameType::PushPromise) | None => {
                warn!(
                    "Unsupported frame type {:#x}, closing connection",
                    frame.frame_type
                );
                self.state = State::Done;
                return Ok(Step::Continue);
            }
        };

        self.state = State::Http2(next);
        Ok(Step::Continue)
    }

    /// Validate a fixed size frame and wait until all of it is buffered.
    fn fixed_payload(&self, expected: u32, control: bool) -> Result<bool, Error> {
        let frame = &self.h2.frame;
        if frame.length != expected {
            return Err(Error::protocol(format!(
                "{} frame of {} bytes, expected {}",
                frame.type_name(),
                frame.length,
                expected
            )));
        }
        if control != (frame.stream_id == 0) {
            return Err(Error::protocol(format!(
                "{} frame on stream {}",
                frame.type_name(),
                frame.stream_id
            )));
        }
        Ok(self.buf.len() >= expected as usize)
    }

    fn frame_done(&mut self) {
        self.state = if self.h2.padding > 0 {
            State::Http2(FrameState::Padding)
        } else if self.h2.resume_preface {
            self.h2.resume_preface = false;
            State::Preface
        } else {
            State::Http2(FrameState::Header)
        };
    }

    fn frame_data(&mut self, registry: &mut Registry) -> Result<Step, Error> {
        let frame = self.h2.frame;

        if frame.stream_id == 0 {
            return Err(Error::protocol("DATA frame on stream 0"));
        }
        match self.h2.streams.get_mut(frame.stream_id) {
            Some(s) if s.accepts_data() => {}
            _ => {
                return Err(Error::protocol(format!(
                    "DATA frame for closed stream {}",
                    frame.stream_id
                )));
            }
        }

        if frame.has_flag(flags::PADDED) && !self.h2.padding_parsed {
            if self.buf.is_empty() {
                return Ok(Step::NeedMore);
            }
            let pad = self.buf[0] as u32;
            self.buf.consume(1);
            let content = frame.length.saturating_sub(1);
            if content <= pad {
                return Err(Error::protocol(format!(
                    "DATA padding {} leaves no content in {} bytes",
                    pad, frame.length
                )));
            }
            let h2 = &mut self.h2;
            h2.frame.length = content - pad;
            h2.padding = pad;
            h2.padding_parsed = true;
            // padding counts against flow control as well
            h2.window -= 1 + pad as i64;
            if let Some(stream) = h2.streams.get_mut(frame.stream_id) {
                stream.window -= 1 + pad as i64;
            }
            return Ok(Step::Continue);
        }

        let left = frame.length as usize;
        if left > 0 && self.buf.is_empty() {
            return Ok(Step::NeedMore);
        }
        let amount = left.min(self.buf.len());
        let last = amount == left;
        let end_stream = last && frame.has_flag(flags::END_STREAM);
        // an h2c upgrade body came over HTTP/1.1 and used no HTTP/2 credit
        let counted = !self.h2.resume_preface;

        let Connection {
            id,
            buf,
            out,
            h2,
            config,
            ..
        } = self;
        let Http2 {
            streams,
            codec,
            window,
            ..
        } = h2;

        if let Some(stream) = streams.get_mut(frame.stream_id) {
            if counted {
                stream.window -= amount as i64;
                *window -= amount as i64;
            }

            let exchange = &mut stream.exchange;
            if let Some(rid) = exchange.pending {
                if amount > 0 || end_stream {
                    let status = if end_stream {
                        DataStatus::Final
                    } else {
                        DataStatus::More
                    };
                    let ctx = exchange.head.ctx(*id, frame.stream_id, &buf[..amount]);
                    let mut h2out =
                        H2Out::new(out, &mut **codec, frame.stream_id, config.max_frame_size);
                    let finished = run_dynamic(
                        registry,
                        rid,
                        status,
                        &ctx,
                        &mut exchange.response,
                        &mut h2out,
                    )?;
                    if finished {
                        exchange.pending = None;
                    }
                }
            } else if amount > 0 {
                trace!(
                    "Discard {} bytes on stream {}",
                    amount,
                    frame.stream_id
                );
            }
        }

        self.buf.consume(amount);
        self.h2.frame.length -= amount as u32;

        if !last {
            return Ok(Step::Continue);
        }

        if counted {
            self.restore_windows(frame.stream_id)?;
        }

        if frame.has_flag(flags::END_STREAM) {
            self.h2.streams.release(frame.stream_id);
        }

        self.frame_done();
        Ok(Step::Continue)
    }

    /// Give back what the peer used of the stream and connection windows.
    fn restore_windows(&mut self, stream_id: u32) -> Result<(), Error> {
        let initial = self.config.initial_window_size as i64;

        if self.h2.window < 0 {
            return Err(Error::protocol("Connection flow control window exceeded"));
        }

        if let Some(stream) = self.h2.streams.get_mut(stream_id) {
            if stream.window < 0 {
                return Err(Error::protocol(format!(
                    "Flow control window of stream {} exceeded",
                    stream_id
                )));
            }
            let increment = initial - stream.window;
            stream.window = initial;
            if increment > 0 {
                frame::write_window_update(&mut self.out, stream_id, increment as u32);
            }
        }

        let increment = initial - self.h2.window;
        self.h2.window = initial;
        if increment > 0 {
            frame::write_window_update(&mut self.out, 0, increment as u32);
        }

        Ok(())
    }

    fn frame_headers(&mut self, registry: &mut Registry) -> Result<Step, Error> {
        let frame = self.h2.frame;

        if frame.stream_id == 0 {
            return Err(Error::protocol("HEADERS frame on stream 0"));
        }
        if self.buf.len() < frame.length as usize {
            return Ok(Step::NeedMore);
        }

        let mut prefix = 0;
        let mut len = frame.length as usize;
        let mut pad = 0;

        if frame.has_flag(flags::PADDED) {
            if len == 0 {
                return Err(Error::protocol("Padded HEADERS frame without pad length"));
            }
            pad = self.buf[0] as usize;
            prefix += 1;
            len -= 1;
            if len <= pad {
                return Err(Error::protocol(format!(
                    "HEADERS padding {} leaves no content in {} bytes",
                    pad, frame.length
                )));
            }
            len -= pad;
        }

        if frame.has_flag(flags::PRIORITY) {
            if len < 5 {
                return Err(Error::protocol("HEADERS frame too short for priority"));
            }
            // exclusive bit, stream dependency and weight are not acted upon
            prefix += 5;
            len -= 5;
        }

        self.buf.consume(prefix);
        self.h2.block = len;
        self.h2.padding = pad as u32;

        if frame.has_flag(flags::END_HEADERS) {
            return self.header_block(registry);
        }

        trace!("Header block continues on stream {}", frame.stream_id);
        self.state = State::Http2(FrameState::Continuation);
        Ok(Step::Continue)
    }

    fn frame_continuation(&mut self, registry: &mut Registry) -> Result<Step, Error> {
        let at = self.h2.block + self.h2.padding as usize;

        if self.buf.len() < at {
            return Ok(Step::NeedMore);
        }
        let next = match FrameHeader::parse(&self.buf[at..]) {
            Some(f) => f,
            None => return Ok(Step::NeedMore),
        };

        if next.kind() != Some(FrameType::Continuation) || next.stream_id != self.h2.frame.stream_id
        {
            return Err(Error::protocol(format!(
                "Expected CONTINUATION on stream {}, got {} on stream {}",
                self.h2.frame.stream_id,
                next.type_name(),
                next.stream_id
            )));
        }

        if self.buf.len() < at + FRAME_HEADER_SIZE + next.length as usize {
            return Ok(Step::NeedMore);
        }

        trace!(
            "Splice CONTINUATION stream: {} len: {}",
            next.stream_id,
            next.length
        );

        // drop the padding of the previous frame together with this frame header
        self.buf.remove(self.h2.block..(at + FRAME_HEADER_SIZE));
        self.h2.padding = 0;
        self.h2.block += next.length as usize;

        if next.has_flag(flags::END_HEADERS) {
            return self.header_block(registry);
        }

        Ok(Step::Continue)
    }

    /// A full header block is at the start of the buffer.
    fn header_block(&mut self, registry: &mut Registry) -> Result<Step, Error> {
        let frame = self.h2.frame;
        let len = self.h2.block;
        let end_stream = frame.has_flag(flags::END_STREAM);

        let mut method = None;
        let mut path = None;

        {
            let Connection { buf, h2, config, .. } = self;
            let Http2 { codec, scratch, .. } = h2;
            scratch.reset(config);

            codec.decode_block(&buf[..len], &mut |name, value| {
                trace!(
                    "Header {}: {}",
                    String::from_utf8_lossy(name),
                    String::from_utf8_lossy(value)
                );
                match name {
                    b":method" => method = Method::from_bytes(value).ok(),
                    b":path" => path = std::str::from_utf8(value).ok().map(String::from),
                    _ if name.starts_with(b":") => {}
                    _ => scratch.header(config, name, value),
                }
            })?;
        }

        self.buf.consume(len);
        self.h2.block = 0;

        let stream_id = frame.stream_id;

        if let Some(stream) = self.h2.streams.get_mut(stream_id) {
            // trailers
            if stream.state != StreamState::Open || !end_stream {
                return Err(Error::protocol(format!(
                    "HEADERS on stream {} that is not expecting trailers",
                    stream_id
                )));
            }
            debug!("Trailers on stream {}", stream_id);
            stream.state = StreamState::HalfClosedRemote;

            if let Some(rid) = stream.exchange.pending.take() {
                let exchange = &mut stream.exchange;
                let ctx = exchange.head.ctx(self.id, stream_id, &[]);
                let mut h2out = H2Out::new(
                    &mut self.out,
                    &mut *self.h2.codec,
                    stream_id,
                    self.config.max_frame_size,
                );
                run_dynamic(
                    registry,
                    rid,
                    DataStatus::Final,
                    &ctx,
                    &mut exchange.response,
                    &mut h2out,
                )?;
            }

            self.h2.streams.release(stream_id);
            self.frame_done();
            return Ok(Step::Continue);
        }

        if stream_id % 2 == 0 || stream_id <= self.h2.last_stream_id {
            return Err(Error::protocol(format!(
                "Invalid stream id {} after {}",
                stream_id, self.h2.last_stream_id
            )));
        }

        let (method, path) = match (method, path) {
            (Some(m), Some(p)) => (m, p),
            _ => {
                return Err(Error::protocol(format!(
                    "Missing :method or :path on stream {}",
                    stream_id
                )));
            }
        };

        if path.len() > self.config.max_url_len {
            return Err(Error::protocol(format!(
                "Request target too long: {} bytes",
                path.len()
            )));
        }

        self.h2.last_stream_id = stream_id;

        let Connection {
            id, out, h2, config, ..
        } = self;
        let Http2 {
            streams,
            codec,
            scratch,
            ..
        } = h2;

        let stream = streams.open(stream_id, config)?;
        std::mem::swap(&mut stream.exchange.head, scratch);
        stream.exchange.head.method = method;
        stream.exchange.head.url = path;
        if end_stream {
            stream.state = StreamState::HalfClosedRemote;
        }

        debug!(
            "Request stream: {} {} {}",
            stream_id, stream.exchange.head.method, stream.exchange.head.url
        );

        let exchange = &mut stream.exchange;
        let mut h2out = H2Out::new(out, &mut **codec, stream_id, config.max_frame_size);
        let dispatched = dispatch(
            registry,
            config,
            &exchange.head,
            *id,
            stream_id,
            !end_stream,
            &mut exchange.response,
            &mut h2out,
        )?;

        exchange.pending = match dispatched {
            Dispatched::AwaitBody(rid) => Some(rid),
            Dispatched::Done => None,
        };

        if end_stream {
            streams.release(stream_id);
        }

        self.frame_done();
        Ok(Step::Continue)
    }

    fn frame_settings(&mut self) -> Result<Step, Error> {
        let frame = self.h2.frame;

        if frame.stream_id != 0 {
            return Err(Error::protocol("SETTINGS frame on a stream"));
        }

        if frame.has_flag(flags::ACK) {
            if frame.length != 0 {
                return Err(Error::protocol("SETTINGS ACK with payload"));
            }
            trace!("SETTINGS acknowledged");
            self.state = State::Http2(FrameState::Header);
            return Ok(Step::Continue);
        }

        if frame.length as usize % frame::SETTINGS_FIELD_SIZE != 0 {
            return Err(Error::protocol(format!(
                "SETTINGS frame of {} bytes",
                frame.length
            )));
        }

        while self.h2.frame.length > 0 {
            if self.buf.len() < frame::SETTINGS_FIELD_SIZE {
                return Ok(Step::NeedMore);
            }
            let b = &self.buf;
            let id = u16::from_be_bytes([b[0], b[1]]);
            let value = u32::from_be_bytes([b[2], b[3], b[4], b[5]]);
            trace!("Setting {:#x} = {}", id, value);
            self.buf.consume(frame::SETTINGS_FIELD_SIZE);
            self.h2.frame.length -= frame::SETTINGS_FIELD_SIZE as u32;
        }

        frame::write_settings_ack(&mut self.out);
        self.state = State::Http2(FrameState::Header);
        Ok(Step::Continue)
    }

    fn frame_window_update(&mut self) -> Result<Step, Error> {
        let stream_id = self.h2.frame.stream_id;

        if self.h2.frame.length != 4 {
            return Err(Error::protocol(format!(
                "WINDOW_UPDATE frame of {} bytes",
                self.h2.frame.length
            )));
        }
        if self.buf.len() < 4 {
            return Ok(Step::NeedMore);
        }

        let b = &self.buf;
        let increment = u32::from_be_bytes([b[0], b[1], b[2], b[3]]) & frame::STREAM_ID_MASK;
        // we don't send more than fits a window, the credit isn't tracked
        trace!("Window update stream: {} increment: {}", stream_id, increment);
        self.buf.consume(4);

        self.state = State::Http2(FrameState::Header);
        Ok(Step::Continue)
    }

    fn frame_rst_stream(&mut self, registry: &mut Registry) -> Result<Step, Error> {
        if !self.fixed_payload(4, false)? {
            return Ok(Step::NeedMore);
        }

        let b = &self.buf;
        let code = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        self.buf.consume(4);

        let stream_id = self.h2.frame.stream_id;
        debug!("RST_STREAM stream: {} error code: {:#x}", stream_id, code);

        let id = self.id;
        if let Some(stream) = self.h2.streams.get_mut(stream_id) {
            stream.exchange.abort(registry, id, stream_id);
        }
        self.h2.streams.release(stream_id);

        self.state = State::Http2(FrameState::Header);
        Ok(Step::Continue)
    }

    fn frame_goaway(&mut self) -> Result<Step, Error> {
        if !self.fixed_payload(8, true)? {
            return Ok(Step::NeedMore);
        }

        let b = &self.buf;
        let last = u32::from_be_bytes([b[0], b[1], b[2], b[3]]) & frame::STREAM_ID_MASK;
        let code = u32::from_be_bytes([b[4], b[5], b[6], b[7]]);
        self.buf.consume(8);

        debug!("GOAWAY last stream: {} error code: {:#x}", last, code);
        self.state = State::Done;
        Ok(Step::Continue)
    }

    fn frame_priority(&mut self) -> Result<Step, Error> {
        if !self.fixed_payload(5, false)? {
            return Ok(Step::NeedMore);
        }
        self.buf.consume(5);
        self.state = State::Http2(FrameState::Header);
        Ok(Step::Continue)
    }

    fn frame_ping(&mut self) -> Result<Step, Error> {
        if !self.fixed_payload(8, true)? {
            return Ok(Step::NeedMore);
        }

        if !self.h2.frame.has_flag(flags::ACK) {
            frame::write_ping_ack(&mut self.out, &self.buf[..8]);
        }
        self.buf.consume(8);

        self.state = State::Http2(FrameState::Header);
        Ok(Step::Continue)
    }

    fn frame_padding(&mut self) -> Result<Step, Error> {
        if self.buf.is_empty() {
            return Ok(Step::NeedMore);
        }
        let amount = (self.h2.padding as usize).min(self.buf.len());
        self.buf.consume(amount);
        self.h2.padding -= amount as u32;

        if self.h2.padding == 0 {
            self.frame_done();
        }
        Ok(Step::Continue)
    }

    /// Answer an `Upgrade: h2c` request. The request goes on as stream 1, its body (if any)
    /// is read as a DATA frame, then the client preface is expected.
    pub(crate) fn upgrade_h2c(
        &mut self,
        registry: &mut Registry,
        body: BodyReader,
    ) -> Result<Step, Error> {
        let content_length = match body {
            BodyReader::NoBody => 0,
            BodyReader::ContentLength { remaining } => remaining,
            BodyReader::Chunked(_) => {
                return Err(Error::protocol("Chunked request body on h2c upgrade"));
            }
        };
        if content_length > frame::MAX_FRAME_LENGTH as u64 {
            return Err(Error::protocol(format!(
                "Request body of {} bytes on h2c upgrade",
                content_length
            )));
        }

        write!(
            self.out,
            "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: h2c\r\n\r\n"
        )?;
        debug!("Upgrade {:?} to h2c", self.id);

        self.upgraded = true;
        self.send_settings();

        let Connection {
            id, out, h1, h2, config, ..
        } = self;
        let Http2 {
            streams,
            codec,
            last_stream_id,
            ..
        } = h2;

        let stream = streams.open(UPGRADE_STREAM_ID, config)?;
        std::mem::swap(&mut stream.exchange.head, &mut h1.exchange.head);
        *last_stream_id = UPGRADE_STREAM_ID;

        let body_follows = content_length > 0;
        stream.state = StreamState::HalfClosedRemote;

        let exchange = &mut stream.exchange;
        let mut h2out = H2Out::new(out, &mut **codec, UPGRADE_STREAM_ID, config.max_frame_size);
        let dispatched = dispatch(
            registry,
            config,
            &exchange.head,
            *id,
            UPGRADE_STREAM_ID,
            body_follows,
            &mut exchange.response,
            &mut h2out,
        )?;
        exchange.pending = match dispatched {
            Dispatched::AwaitBody(rid) => Some(rid),
            Dispatched::Done => None,
        };

        h1.exchange.reset(config);

        if !body_follows {
            streams.release(UPGRADE_STREAM_ID);
            self.state = State::Preface;
            return Ok(Step::Continue);
        }

        // the body is read as if it came in a DATA frame ending the stream
        let h2 = &mut self.h2;
        h2.frame = FrameHeader::new(
            FrameType::Data,
            flags::END_STREAM,
            UPGRADE_STREAM_ID,
            content_length as u32,
        );
        h2.padding = 0;
        h2.padding_parsed = false;
        h2.resume_preface = true;
        self.state = State::Http2(FrameState::Data);

        Ok(Step::Continue)
    }
}
