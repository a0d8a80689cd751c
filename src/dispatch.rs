use crate::capture::HeaderCapture;
use crate::compose::{send_dynamic, send_status, Compose, ResponseState};
use crate::config::Config;
use crate::fs::{self, AcceptEncoding, FileSystem};
use crate::resource::{split_query, ConnectionId, DataStatus, Detail, HolderToken};
use crate::resource::{Registry, RequestCtx, ResourceId};
use crate::Error;
use http::Method;
use std::io;
use std::path::Path;

/// What we keep of a request head, the same for both protocol versions.
#[derive(Debug)]
pub(crate) struct RequestHead {
    pub method: Method,
    pub url: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub accept: AcceptEncoding,
    pub capture: HeaderCapture,
}

impl RequestHead {
    pub fn new(config: &Config) -> Self {
        let mut head = RequestHead {
            method: Method::GET,
            url: String::new(),
            content_type: None,
            content_length: None,
            accept: AcceptEncoding::default(),
            capture: HeaderCapture::new(config.capture_buffer_size, config.capture_header_count),
        };
        head.reset(config);
        head
    }

    pub fn reset(&mut self, config: &Config) {
        self.method = Method::GET;
        self.url.clear();
        self.content_type = None;
        self.content_length = None;
        self.accept = AcceptEncoding::default();
        self.capture.reset(!config.capture_headers.is_empty());
    }

    /// Take note of one (non pseudo) request header.
    pub fn header(&mut self, config: &Config, name: &[u8], value: &[u8]) {
        let text = std::str::from_utf8(value).ok().map(str::trim);

        if name.eq_ignore_ascii_case(b"content-type") {
            self.content_type = text.map(String::from);
        } else if name.eq_ignore_ascii_case(b"content-length") {
            self.content_length = text.and_then(|v| v.parse().ok());
        } else if name.eq_ignore_ascii_case(b"accept-encoding") {
            self.accept = text.map(AcceptEncoding::parse).unwrap_or_default();
        }

        self.capture.offer(&config.capture_headers, name, value);
    }

    pub fn ctx<'a>(
        &'a self,
        connection: ConnectionId,
        stream_id: u32,
        data: &'a [u8],
    ) -> RequestCtx<'a> {
        RequestCtx {
            connection,
            stream_id,
            method: &self.method,
            url: &self.url,
            data,
            headers: &self.capture,
        }
    }

    /// GET and DELETE hand the query string to dynamic resources instead of a body.
    fn takes_query(&self) -> bool {
        self.method == Method::GET || self.method == Method::DELETE
    }
}

/// One request/response exchange: an HTTP/1.1 request or an HTTP/2 stream.
#[derive(Debug)]
pub(crate) struct Exchange {
    pub head: RequestHead,
    pub response: ResponseState,
    /// Dynamic resource held while its request body is coming in.
    pub pending: Option<ResourceId>,
}

impl Exchange {
    pub fn new(config: &Config) -> Self {
        Exchange {
            head: RequestHead::new(config),
            response: ResponseState::default(),
            pending: None,
        }
    }

    pub fn reset(&mut self, config: &Config) {
        self.head.reset(config);
        self.response = ResponseState::default();
        self.pending = None;
    }

    /// Tell a held resource that this exchange is gone.
    pub fn abort(&mut self, registry: &mut Registry, connection: ConnectionId, stream_id: u32) {
        if let Some(id) = self.pending.take() {
            let ctx = self.head.ctx(connection, stream_id, &[]);
            registry.abort(id, &ctx);
        }
    }
}

/// Outcome of routing a request head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatched {
    /// The response is complete, a request body (if any) is ignored.
    Done,
    /// A dynamic resource is held and waits for the request body.
    AwaitBody(ResourceId),
}

/// Route a request whose head is complete and answer it as far as possible.
#[allow(clippy::too_many_arguments)]
pub(crate) fn dispatch(
    registry: &mut Registry,
    config: &Config,
    head: &RequestHead,
    connection: ConnectionId,
    stream_id: u32,
    body_follows: bool,
    state: &mut ResponseState,
    out: &mut dyn Compose,
) -> Result<Dispatched, Error> {
    let id = match registry.lookup(&head.url) {
        Some(id) => id,
        None => {
            debug!("No resource for: {} {}", head.method, head.url);
            out.not_found()?;
            *state = ResponseState {
                headers_sent: true,
                end_sent: true,
            };
            return Ok(Dispatched::Done);
        }
    };

    let resource = registry
        .get(id)
        .ok_or_else(|| Error::Application(format!("Missing resource {}", id)))?;

    if !resource.methods.contains(&head.method) {
        debug!("Method {} not allowed for: {}", head.method, resource.path);
        send_status(out, state, 405)?;
        return Ok(Dispatched::Done);
    }

    match &resource.detail {
        Detail::Static { body, encoding } => {
            let mut headers = vec![(
                "Content-Type",
                resource.content_type.as_deref().unwrap_or("text/html"),
            )];
            if let Some(enc) = encoding {
                headers.push(("Content-Encoding", enc.as_str()));
            }
            out.head_sized(200, &headers, body.len() as u64)?;
            if !body.is_empty() {
                out.data(body, true)?;
            }
            *state = ResponseState {
                headers_sent: true,
                end_sent: true,
            };
            return Ok(Dispatched::Done);
        }

        Detail::StaticFs { root } => {
            send_file(registry.fs(), root, head, config, state, out)?;
            return Ok(Dispatched::Done);
        }

        Detail::Websocket { .. } => {
            debug!("Websocket resource without upgrade: {}", resource.path);
            send_status(out, state, 400)?;
            return Ok(Dispatched::Done);
        }

        Detail::Dynamic { .. } => {}
    }

    let token = HolderToken {
        connection,
        stream_id,
    };
    if !registry.acquire(id, token) {
        debug!(
            "Resource {} busy with {:?}, reject {:?}",
            head.url,
            registry.holder(id),
            token
        );
        send_status(out, state, 409)?;
        return Ok(Dispatched::Done);
    }

    if head.takes_query() || !body_follows {
        let data = if head.takes_query() {
            split_query(&head.url).1.as_bytes()
        } else {
            &[]
        };
        let ctx = head.ctx(connection, stream_id, data);
        run_dynamic(registry, id, DataStatus::Final, &ctx, state, out)?;
        return Ok(Dispatched::Done);
    }

    Ok(Dispatched::AwaitBody(id))
}

/// Invoke a dynamic resource and send what it answers. With `DataStatus::Final` it is invoked
/// until it answered a final response, after which the resource is released.
///
/// Returns true when the exchange is done with the resource.
pub(crate) fn run_dynamic(
    registry: &mut Registry,
    id: ResourceId,
    status: DataStatus,
    request: &RequestCtx<'_>,
    state: &mut ResponseState,
    out: &mut dyn Compose,
) -> Result<bool, Error> {
    let content_type = registry.get(id).and_then(|r| r.content_type.clone());
    let mut ctx = *request;

    loop {
        let rsp = match registry.invoke(id, status, &ctx) {
            Ok(rsp) => rsp,
            Err(e) => return fail(registry, id, request, state, out, e.to_string()),
        };

        if let Err(e) = send_dynamic(out, state, &rsp, status, content_type.as_deref()) {
            return fail(registry, id, request, state, out, e.to_string());
        }

        if status != DataStatus::Final || rsp.is_final(status) {
            break;
        }

        // request data was handed over already
        ctx.data = &[];
    }

    if status == DataStatus::Final {
        registry.release(id, request.holder());
        return Ok(true);
    }

    Ok(false)
}

fn fail(
    registry: &mut Registry,
    id: ResourceId,
    request: &RequestCtx<'_>,
    state: &mut ResponseState,
    out: &mut dyn Compose,
    msg: String,
) -> Result<bool, Error> {
    warn!("Dynamic resource {} failed: {}", request.url, msg);
    registry.release(id, request.holder());

    if state.headers_sent {
        // can't take back a status line that went out already
        return Err(Error::Application(msg));
    }

    send_status(out, state, 500)?;
    Ok(true)
}

fn send_file(
    fs: &dyn FileSystem,
    root: &Path,
    head: &RequestHead,
    config: &Config,
    state: &mut ResponseState,
    out: &mut dyn Compose,
) -> Result<(), Error> {
    let path = split_query(&head.url).0;

    let file = match fs::resolve(fs, root, path, head.accept, config.compression) {
        Some(f) => f,
        None => {
            debug!("No file for: {}", path);
            out.not_found()?;
            *state = ResponseState {
                headers_sent: true,
                end_sent: true,
            };
            return Ok(());
        }
    };

    let mut reader = match fs.open(&file.path) {
        Ok(r) => r,
        Err(e) => {
            warn!("Failed to open {:?}: {}", file.path, e);
            return send_status(out, state, 500);
        }
    };

    let mut headers = vec![("Content-Type", file.content_type)];
    if let Some(enc) = file.encoding {
        headers.push(("Content-Encoding", enc.token()));
    }
    out.head_sized(200, &headers, file.size)?;
    state.headers_sent = true;

    let mut remaining = file.size;
    let mut buf = vec![0; config.max_frame_size.max(1)];

    while remaining > 0 {
        let max = (remaining.min(buf.len() as u64)) as usize;
        let amount = reader.read(&mut buf[..max])?;
        if amount == 0 {
            let msg = format!(
                "File {:?} ended {} bytes before its stated size",
                file.path, remaining
            );
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, msg).into());
        }
        remaining -= amount as u64;
        out.data(&buf[..amount], remaining == 0)?;
    }

    state.end_sent = true;
    Ok(())
}
