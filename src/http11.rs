//! HTTP/1.1 side of a connection: request heads, request bodies, keep-alive and the two
//! upgrades (`h2c` and `websocket`).

use crate::compose::{send_status, H1Out};
use crate::connection::{Connection, State, Step};
use crate::dispatch::{dispatch, run_dynamic, Dispatched, Exchange};
use crate::config::Config;
use crate::resource::{DataStatus, Registry};
use crate::Error;
use std::ops::Range;
use std::str::FromStr;

/// Max number of request headers we parse.
const MAX_HEADERS: usize = 128;

/// Attempt to parse an http/1.1 request head. `None` until the full head is buffered.
pub fn try_parse_req(buf: &[u8]) -> Result<Option<(http::Request<()>, usize)>, Error> {
    trace!("try_parse_req: {:?}", String::from_utf8_lossy(buf));

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parser = httparse::Request::new(&mut headers);

    let status = parser.parse(buf)?;

    let len = match status {
        httparse::Status::Partial => return Ok(None),
        httparse::Status::Complete(len) => len,
    };

    let mut bld = http::Request::builder().version(if parser.version == Some(1) {
        http::Version::HTTP_11
    } else {
        http::Version::HTTP_10
    });

    if let Some(path) = parser.path {
        bld = bld.uri(path);
    }

    if let Some(method) = parser.method {
        bld = bld.method(method);
    }

    for head in parser.headers.iter() {
        let name = http::header::HeaderName::from_bytes(head.name.as_bytes());
        let value = http::header::HeaderValue::from_bytes(head.value);
        match (name, value) {
            (Ok(name), Ok(value)) => bld = bld.header(name, value),
            (Err(e), _) => {
                debug!("Dropping bad header name: {}", e);
            }
            (Ok(name), Err(e)) => {
                debug!("Dropping bad header value ({}): {}", name, e);
            }
        }
    }

    let built = bld
        .body(())
        .map_err(|e| Error::protocol(format!("Bad request head: {}", e)))?;

    debug!("try_parse_http11 success: {:?}", built);

    Ok(Some((built, len)))
}

fn is_chunked(headers: &http::HeaderMap<http::HeaderValue>) -> bool {
    get_str(headers, "transfer-encoding")
        // If a Transfer-Encoding header field is present and has any value other
        // than "identity", then the transfer-length is defined by use of the
        // "chunked" transfer-coding
        .map(|h| !h.contains("identity"))
        .unwrap_or(false)
}

pub(crate) fn allow_reuse(
    headers: &http::HeaderMap<http::HeaderValue>,
    version: http::Version,
) -> bool {
    if version == http::Version::HTTP_11 {
        is_keep_alive(headers, true)
    } else {
        is_keep_alive(headers, false)
    }
}

fn is_keep_alive(headers: &http::HeaderMap<http::HeaderValue>, default: bool) -> bool {
    get_str(headers, "connection")
        .and_then(|h| {
            if has_token(h, "keep-alive") {
                Some(true)
            } else if has_token(h, "close") {
                Some(false)
            } else {
                None
            }
        })
        .unwrap_or(default)
}

/// `Connection` and `Upgrade` are comma separated token lists.
fn has_token(value: &str, token: &str) -> bool {
    value.split(',').any(|t| t.trim().eq_ignore_ascii_case(token))
}

fn get_str<'a>(headers: &'a http::HeaderMap, key: &str) -> Option<&'a str> {
    headers.get(key).and_then(|v| v.to_str().ok())
}

fn get_as<T: FromStr>(headers: &http::HeaderMap, key: &str) -> Option<T> {
    get_str(headers, key).and_then(|v| v.trim().parse().ok())
}

/// Upgrade the client asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Upgrade {
    H2c,
    Websocket {
        key: Option<String>,
        version: Option<String>,
    },
}

fn upgrade_of(headers: &http::HeaderMap) -> Option<Upgrade> {
    let connection = get_str(headers, "connection").unwrap_or("");
    if !has_token(connection, "upgrade") {
        return None;
    }
    let upgrade = get_str(headers, "upgrade")?;
    if has_token(upgrade, "h2c") {
        Some(Upgrade::H2c)
    } else if has_token(upgrade, "websocket") {
        let key = get_str(headers, "sec-websocket-key").map(|k| k.trim().to_string());
        let version = get_str(headers, "sec-websocket-version").map(|v| v.trim().to_string());
        Some(Upgrade::Websocket { key, version })
    } else {
        debug!("Ignore unknown upgrade: {}", upgrade);
        None
    }
}

/// Reads a request body out of the receive buffer, piece by piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyReader {
    NoBody,
    ContentLength { remaining: u64 },
    Chunked(ChunkState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkState {
    Size,
    Data(u64),
    /// CRLF after chunk data.
    DataEnd,
    Trailer,
    End,
}

impl BodyReader {
    /// Transfer-Encoding wins over Content-Length. Without either there is no body.
    fn from_headers(headers: &http::HeaderMap) -> Self {
        let ret = if is_chunked(headers) {
            BodyReader::Chunked(ChunkState::Size)
        } else if let Some(size) = get_as::<u64>(headers, "content-length") {
            BodyReader::ContentLength { remaining: size }
        } else {
            BodyReader::NoBody
        };

        trace!("BodyReader from headers: {:?}", ret);

        ret
    }

    pub fn is_no_body(&self) -> bool {
        match self {
            BodyReader::ContentLength { remaining } => *remaining == 0,
            BodyReader::NoBody => true,
            _ => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            BodyReader::NoBody => true,
            BodyReader::ContentLength { remaining } => *remaining == 0,
            BodyReader::Chunked(s) => *s == ChunkState::End,
        }
    }

    /// Read the next piece of body from `buf`. Returns how much of `buf` it took and where in
    /// `buf` the body data is, or `None` if more input is needed first.
    pub fn read(&mut self, buf: &[u8]) -> Result<Option<(usize, Range<usize>)>, Error> {
        match self {
            BodyReader::NoBody => Ok(Some((0, 0..0))),

            BodyReader::ContentLength { remaining } => {
                if buf.is_empty() {
                    return Ok(None);
                }
                let amount = (*remaining).min(buf.len() as u64) as usize;
                *remaining -= amount as u64;
                Ok(Some((amount, 0..amount)))
            }

            BodyReader::Chunked(state) => match *state {
                ChunkState::Size => match httparse::parse_chunk_size(buf) {
                    Ok(httparse::Status::Complete((used, size))) => {
                        trace!("Chunk size: {}", size);
                        *state = if size == 0 {
                            ChunkState::Trailer
                        } else {
                            ChunkState::Data(size)
                        };
                        Ok(Some((used, 0..0)))
                    }
                    Ok(httparse::Status::Partial) => Ok(None),
                    Err(_) => Err(Error::protocol("Invalid chunk size")),
                },

                ChunkState::Data(left) => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let amount = left.min(buf.len() as u64) as usize;
                    let left = left - amount as u64;
                    *state = if left == 0 {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data(left)
                    };
                    Ok(Some((amount, 0..amount)))
                }

                ChunkState::DataEnd => {
                    if buf.len() < 2 {
                        return Ok(None);
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(Error::protocol("Missing CRLF after chunk"));
                    }
                    *state = ChunkState::Size;
                    Ok(Some((2, 0..0)))
                }

                // trailer fields are skipped line by line until the empty line
                ChunkState::Trailer => match buf.windows(2).position(|w| w == b"\r\n") {
                    Some(0) => {
                        *state = ChunkState::End;
                        Ok(Some((2, 0..0)))
                    }
                    Some(i) => Ok(Some((i + 2, 0..0))),
                    None => Ok(None),
                },

                ChunkState::End => Ok(Some((0, 0..0))),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Head,
    Body,
}

/// HTTP/1.1 state of a connection. One exchange at a time.
#[derive(Debug)]
pub(crate) struct Http1 {
    pub exchange: Exchange,
    phase: Phase,
    body: BodyReader,
    keep_alive: bool,
}

impl Http1 {
    pub fn new(config: &Config) -> Self {
        Http1 {
            exchange: Exchange::new(config),
            phase: Phase::Head,
            body: BodyReader::NoBody,
            keep_alive: true,
        }
    }

    fn reset(&mut self, config: &Config) {
        self.exchange.reset(config);
        self.phase = Phase::Head;
        self.body = BodyReader::NoBody;
    }
}

impl Connection {
    pub(crate) fn on_http1(&mut self, registry: &mut Registry) -> Result<Step, Error> {
        match self.h1.phase {
            Phase::Head => self.http1_head(registry),
            Phase::Body => self.http1_body(registry),
        }
    }

    fn http1_head(&mut self, registry: &mut Registry) -> Result<Step, Error> {
        if self.buf.is_empty() {
            return Ok(Step::NeedMore);
        }

        let (req, len) = match try_parse_req(&self.buf)? {
            Some(v) => v,
            None => return Ok(Step::NeedMore),
        };
        self.buf.consume(len);

        let config = &*self.config;
        let head = &mut self.h1.exchange.head;
        head.reset(config);

        let url = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        if url.len() > config.max_url_len {
            debug!("Request target too long: {} bytes", url.len());
            let mut out = H1Out::new(&mut self.out);
            send_status(&mut out, &mut self.h1.exchange.response, 414)?;
            self.state = State::Done;
            return Ok(Step::Continue);
        }

        head.method = req.method().clone();
        head.url.push_str(url);
        for (name, value) in req.headers() {
            head.header(config, name.as_str().as_bytes(), value.as_bytes());
        }

        self.h1.keep_alive = allow_reuse(req.headers(), req.version());
        self.h1.body = BodyReader::from_headers(req.headers());

        match upgrade_of(req.headers()) {
            Some(Upgrade::H2c) => {
                let body = self.h1.body;
                return self.upgrade_h2c(registry, body);
            }
            Some(Upgrade::Websocket { key, version }) => {
                return self.upgrade_websocket(registry, key.as_deref(), version.as_deref())
            }
            None => {}
        }

        let body_follows = !self.h1.body.is_no_body();

        let dispatched = dispatch(
            registry,
            config,
            &self.h1.exchange.head,
            self.id,
            0,
            body_follows,
            &mut self.h1.exchange.response,
            &mut H1Out::new(&mut self.out),
        )?;

        self.h1.exchange.pending = match dispatched {
            Dispatched::AwaitBody(id) => Some(id),
            Dispatched::Done => None,
        };
        self.h1.phase = Phase::Body;

        Ok(Step::Continue)
    }

    fn http1_body(&mut self, registry: &mut Registry) -> Result<Step, Error> {
        loop {
            if self.h1.body.is_complete() {
                return self.http1_complete(registry);
            }

            let (used, data) = match self.h1.body.read(&self.buf)? {
                Some(v) => v,
                None => return Ok(Step::NeedMore),
            };

            let done = self.h1.body.is_complete();
            let exchange = &mut self.h1.exchange;

            if let Some(id) = exchange.pending {
                if !data.is_empty() || done {
                    let status = if done {
                        DataStatus::Final
                    } else {
                        DataStatus::More
                    };
                    let ctx = exchange.head.ctx(self.id, 0, &self.buf[data]);
                    let finished = run_dynamic(
                        registry,
                        id,
                        status,
                        &ctx,
                        &mut exchange.response,
                        &mut H1Out::new(&mut self.out),
                    )?;
                    if finished {
                        exchange.pending = None;
                    }
                }
            } else if !data.is_empty() {
                trace!("Discard {} bytes of request body", data.len());
            }

            self.buf.consume(used);
        }
    }

    fn http1_complete(&mut self, registry: &mut Registry) -> Result<Step, Error> {
        let exchange = &mut self.h1.exchange;

        // a body that ended without the last piece reaching the resource
        if let Some(id) = exchange.pending.take() {
            let ctx = exchange.head.ctx(self.id, 0, &[]);
            run_dynamic(
                registry,
                id,
                DataStatus::Final,
                &ctx,
                &mut exchange.response,
                &mut H1Out::new(&mut self.out),
            )?;
        }

        trace!("Request complete, keep-alive: {}", self.h1.keep_alive);

        if !self.h1.keep_alive {
            self.state = State::Done;
        }
        self.h1.reset(&self.config);

        Ok(Step::Continue)
    }
}
