//! Resources a server answers for, and the registry holding them.
//!
//! A registry is shared by all connections of a server. The only state in it that changes
//! while serving is the holder of each dynamic resource: one exchange at a time may be in the
//! middle of talking to a dynamic resource, everyone else is told 409 Conflict.

use crate::capture::HeaderCapture;
use crate::fs::{FileSystem, StdFs};
use http::Method;
use std::fmt;
use std::path::PathBuf;

/// Index of a resource in its [`Registry`].
pub type ResourceId = usize;

/// Error type returned by application handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Identifies one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// The exchange currently holding a dynamic resource. HTTP/1.1 exchanges use stream 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HolderToken {
    /// Connection of the exchange.
    pub connection: ConnectionId,
    /// HTTP/2 stream of the exchange.
    pub stream_id: u32,
}

/// Set of request methods a resource supports.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodSet(u16);

const KNOWN_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
];

impl MethodSet {
    /// No methods at all.
    pub fn empty() -> Self {
        MethodSet(0)
    }

    /// Set of the given methods.
    pub fn of(methods: &[Method]) -> Self {
        methods.iter().fold(MethodSet(0), |set, m| set.with(m))
    }

    /// Add a method. Extension methods can't be part of a set and are ignored.
    pub fn with(self, method: &Method) -> Self {
        match bit(method) {
            Some(b) => MethodSet(self.0 | b),
            None => self,
        }
    }

    /// Whether `method` is in the set.
    pub fn contains(&self, method: &Method) -> bool {
        bit(method).map(|b| self.0 & b != 0).unwrap_or(false)
    }
}

fn bit(method: &Method) -> Option<u16> {
    KNOWN_METHODS
        .iter()
        .position(|m| *m == method.as_str())
        .map(|i| 1 << i)
}

impl fmt::Debug for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<&str> = KNOWN_METHODS
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0 & (1 << i) != 0)
            .map(|(_, m)| *m)
            .collect();
        write!(f, "MethodSet({})", names.join("|"))
    }
}

/// Where in the request body a handler invocation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStatus {
    /// More request data will follow.
    More,
    /// This is the last request data. The handler is invoked again until it answers a final
    /// response.
    Final,
    /// The exchange is gone (connection lost, stream reset). No response can be sent.
    Aborted,
}

/// What a dynamic handler gets to see of the request.
#[derive(Debug, Clone, Copy)]
pub struct RequestCtx<'a> {
    /// Connection the request came in on.
    pub connection: ConnectionId,
    /// HTTP/2 stream, 0 for HTTP/1.1.
    pub stream_id: u32,
    /// Request method.
    pub method: &'a Method,
    /// Request target including any query string.
    pub url: &'a str,
    /// A chunk of the request body. For GET and DELETE, the query string.
    pub data: &'a [u8],
    /// Headers captured for the request.
    pub headers: &'a HeaderCapture,
}

impl<'a> RequestCtx<'a> {
    /// The url without query string.
    pub fn path(&self) -> &'a str {
        split_query(self.url).0
    }

    /// Query string without the `?`, empty if there is none.
    pub fn query(&self) -> &'a str {
        split_query(self.url).1
    }

    pub(crate) fn holder(&self) -> HolderToken {
        HolderToken {
            connection: self.connection,
            stream_id: self.stream_id,
        }
    }
}

pub(crate) fn split_query(url: &str) -> (&str, &str) {
    match url.find('?') {
        Some(i) => (&url[..i], &url[(i + 1)..]),
        None => (url, ""),
    }
}

/// A (part of a) response answered by a dynamic handler.
///
/// Status and headers are only sent with the first answer of an exchange. An answer where
/// nothing is set counts as the final one.
#[derive(Debug, Clone, Default)]
pub struct ResponseCtx {
    /// Status code, 200 if not set.
    pub status: Option<u16>,
    /// Extra response headers. A `Content-Type` here replaces the resource's.
    pub headers: Vec<(String, String)>,
    /// Body bytes of this answer.
    pub body: Vec<u8>,
    /// Nothing more follows this answer.
    pub final_chunk: bool,
}

impl ResponseCtx {
    /// An empty answer.
    pub fn new() -> Self {
        ResponseCtx::default()
    }

    /// Set the status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Add a response header.
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body of this answer.
    pub fn with_body<B: Into<Vec<u8>>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Mark the answer as the last one.
    pub fn finished(mut self) -> Self {
        self.final_chunk = true;
        self
    }

    /// Whether the handler set anything at all.
    pub fn is_provided(&self) -> bool {
        self.status.is_some() || !self.headers.is_empty() || !self.body.is_empty() || self.final_chunk
    }

    /// Whether this answer completes the response.
    pub fn is_final(&self, status: DataStatus) -> bool {
        status == DataStatus::Final && (self.final_chunk || !self.is_provided())
    }
}

/// Application logic behind a dynamic resource.
pub trait DynamicHandler: Send {
    /// Called with every piece of request body, see [`DataStatus`]. After
    /// [`DataStatus::Final`] it's called again until the answer is final.
    fn handle(&mut self, status: DataStatus, request: &RequestCtx<'_>)
        -> Result<ResponseCtx, HandlerError>;
}

impl<F> DynamicHandler for F
where
    F: FnMut(DataStatus, &RequestCtx<'_>) -> Result<ResponseCtx, HandlerError> + Send,
{
    fn handle(
        &mut self,
        status: DataStatus,
        request: &RequestCtx<'_>,
    ) -> Result<ResponseCtx, HandlerError> {
        (self)(status, request)
    }
}

/// Told about a completed WebSocket handshake. Frames after it are none of our business, the
/// transport is handed back to the caller of the connection.
pub trait WebsocketHandler: Send {
    /// An error refuses the upgrade with a 500.
    fn on_upgrade(&mut self, request: &RequestCtx<'_>) -> Result<(), HandlerError>;
}

impl<F> WebsocketHandler for F
where
    F: FnMut(&RequestCtx<'_>) -> Result<(), HandlerError> + Send,
{
    fn on_upgrade(&mut self, request: &RequestCtx<'_>) -> Result<(), HandlerError> {
        (self)(request)
    }
}

pub(crate) enum Detail {
    Static {
        body: Vec<u8>,
        encoding: Option<String>,
    },
    StaticFs {
        root: PathBuf,
    },
    Dynamic {
        handler: Box<dyn DynamicHandler>,
        holder: Option<HolderToken>,
    },
    Websocket {
        handler: Box<dyn WebsocketHandler>,
    },
}

pub(crate) struct Resource {
    pub path: String,
    pub methods: MethodSet,
    pub content_type: Option<String>,
    pub detail: Detail,
}

/// Registry of resources, matched in registration order.
///
/// ```
/// use hserve::{DataStatus, HandlerError, MethodSet, Registry, RequestCtx, ResponseCtx};
/// use http::Method;
///
/// let mut reg = Registry::new();
/// reg.add_static("/", "Hello, World!", "text/html");
/// reg.add_dynamic("/echo", MethodSet::of(&[Method::POST]), "text/plain",
///     |_: DataStatus, req: &RequestCtx<'_>| {
///         Ok::<_, HandlerError>(ResponseCtx::new().with_body(req.data))
///     });
///
/// assert_eq!(reg.lookup("/echo?x=1"), Some(1));
/// assert_eq!(reg.lookup("/nope"), None);
/// ```
pub struct Registry {
    resources: Vec<Resource>,
    fs: Box<dyn FileSystem>,
    wildcard_paths: bool,
}

impl Registry {
    /// Empty registry serving files from the real file system.
    pub fn new() -> Self {
        Registry::with_file_system(StdFs)
    }

    /// Empty registry serving files through `fs`.
    pub fn with_file_system<F: FileSystem + 'static>(fs: F) -> Self {
        Registry {
            resources: vec![],
            fs: Box::new(fs),
            wildcard_paths: false,
        }
    }

    /// Match resource paths as shell globs. `*` doesn't match across `/`, and a pattern
    /// matching a leading directory of the request path matches the whole path.
    pub fn set_wildcard_paths(&mut self, enabled: bool) {
        self.wildcard_paths = enabled;
    }

    fn add(&mut self, resource: Resource) -> ResourceId {
        debug!(
            "Register resource {}: {} {:?}",
            self.resources.len(),
            resource.path,
            resource.methods
        );
        self.resources.push(resource);
        self.resources.len() - 1
    }

    /// A fixed blob served for GET.
    pub fn add_static<B: Into<Vec<u8>>>(
        &mut self,
        path: &str,
        body: B,
        content_type: &str,
    ) -> ResourceId {
        self.add(Resource {
            path: path.to_string(),
            methods: MethodSet::of(&[Method::GET]),
            content_type: Some(content_type.to_string()),
            detail: Detail::Static {
                body: body.into(),
                encoding: None,
            },
        })
    }

    /// A fixed blob that is already compressed with `encoding` (sent as `Content-Encoding`).
    pub fn add_static_encoded<B: Into<Vec<u8>>>(
        &mut self,
        path: &str,
        body: B,
        content_type: &str,
        encoding: &str,
    ) -> ResourceId {
        self.add(Resource {
            path: path.to_string(),
            methods: MethodSet::of(&[Method::GET]),
            content_type: Some(content_type.to_string()),
            detail: Detail::Static {
                body: body.into(),
                encoding: Some(encoding.to_string()),
            },
        })
    }

    /// Files under `root`, the request path appended to it.
    pub fn add_static_fs<P: Into<PathBuf>>(&mut self, path: &str, root: P) -> ResourceId {
        self.add(Resource {
            path: path.to_string(),
            methods: MethodSet::of(&[Method::GET]),
            content_type: None,
            detail: Detail::StaticFs { root: root.into() },
        })
    }

    /// Add a resource answered by `handler` for the methods in `methods`. `content_type` is
    /// sent unless the handler sets its own.
    pub fn add_dynamic<H: DynamicHandler + 'static>(
        &mut self,
        path: &str,
        methods: MethodSet,
        content_type: &str,
        handler: H,
    ) -> ResourceId {
        self.add(Resource {
            path: path.to_string(),
            methods,
            content_type: Some(content_type.to_string()),
            detail: Detail::Dynamic {
                handler: Box::new(handler),
                holder: None,
            },
        })
    }

    /// Add a resource that only answers WebSocket upgrades.
    pub fn add_websocket<H: WebsocketHandler + 'static>(
        &mut self,
        path: &str,
        handler: H,
    ) -> ResourceId {
        self.add(Resource {
            path: path.to_string(),
            methods: MethodSet::of(&[Method::GET]),
            content_type: None,
            detail: Detail::Websocket {
                handler: Box::new(handler),
            },
        })
    }

    /// Find the first resource matching the path of `url` (query string ignored).
    pub fn lookup(&self, url: &str) -> Option<ResourceId> {
        let (path, _) = split_query(url);
        self.resources.iter().position(|r| {
            (self.wildcard_paths && glob_match(r.path.as_bytes(), path.as_bytes()))
                || r.path == path
        })
    }

    pub(crate) fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub(crate) fn fs(&self) -> &dyn FileSystem {
        &*self.fs
    }

    /// Current holder of a dynamic resource.
    pub fn holder(&self, id: ResourceId) -> Option<HolderToken> {
        match self.resources.get(id).map(|r| &r.detail) {
            Some(Detail::Dynamic { holder, .. }) => *holder,
            _ => None,
        }
    }

    /// Take a dynamic resource for `token`. `false` if someone else holds it.
    pub fn acquire(&mut self, id: ResourceId, token: HolderToken) -> bool {
        match self.resources.get_mut(id).map(|r| &mut r.detail) {
            Some(Detail::Dynamic { holder, .. }) => match holder {
                Some(h) if *h != token => false,
                _ => {
                    *holder = Some(token);
                    true
                }
            },
            _ => true,
        }
    }

    /// Give back a dynamic resource. Does nothing unless `token` is the holder.
    pub fn release(&mut self, id: ResourceId, token: HolderToken) {
        if let Some(Detail::Dynamic { holder, .. }) =
            self.resources.get_mut(id).map(|r| &mut r.detail)
        {
            if *holder == Some(token) {
                trace!("Release resource {} from {:?}", id, token);
                *holder = None;
            }
        }
    }

    /// Tell the handler its exchange is gone and release the resource.
    pub fn abort(&mut self, id: ResourceId, request: &RequestCtx<'_>) {
        let token = request.holder();
        if self.holder(id) != Some(token) {
            return;
        }
        debug!("Abort resource {} held by {:?}", id, token);
        if let Err(e) = self.invoke(id, DataStatus::Aborted, request) {
            warn!("Handler failed on abort: {}", e);
        }
        self.release(id, token);
    }

    pub(crate) fn invoke(
        &mut self,
        id: ResourceId,
        status: DataStatus,
        request: &RequestCtx<'_>,
    ) -> Result<ResponseCtx, HandlerError> {
        match self.resources.get_mut(id).map(|r| &mut r.detail) {
            Some(Detail::Dynamic { handler, .. }) => handler.handle(status, request),
            _ => Err(format!("Resource {} is not dynamic", id).into()),
        }
    }

    pub(crate) fn notify_upgrade(
        &mut self,
        id: ResourceId,
        request: &RequestCtx<'_>,
    ) -> Result<(), HandlerError> {
        match self.resources.get_mut(id).map(|r| &mut r.detail) {
            Some(Detail::Websocket { handler }) => handler.on_upgrade(request),
            _ => Err(format!("Resource {} is not a websocket", id).into()),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let paths: Vec<&str> = self.resources.iter().map(|r| r.path.as_str()).collect();
        f.debug_struct("Registry").field("resources", &paths).finish()
    }
}

/// Shell glob match where `*` and `?` don't match `/`, and a pattern matching up to a `/` of
/// the subject is a match (leading directory).
fn glob_match(pat: &[u8], s: &[u8]) -> bool {
    match pat.split_first() {
        None => s.is_empty() || s[0] == b'/',
        Some((b'*', rest)) => {
            let mut i = 0;
            loop {
                if glob_match(rest, &s[i..]) {
                    return true;
                }
                if i == s.len() || s[i] == b'/' {
                    return false;
                }
                i += 1;
            }
        }
        Some((b'?', rest)) => !s.is_empty() && s[0] != b'/' && glob_match(rest, &s[1..]),
        Some((b'[', rest)) => match class_match(rest, s.first().copied()) {
            Some((true, after)) => glob_match(after, &s[1..]),
            Some((false, _)) => false,
            // no closing bracket, take it literally
            None => s.first() == Some(&b'[') && glob_match(rest, &s[1..]),
        },
        Some((c, rest)) => s.first() == Some(c) && glob_match(rest, &s[1..]),
    }
}

/// Match `c` against a bracket expression (after the `[`). Returns whether it matched and
/// the pattern after the closing `]`, or None if the expression is unterminated.
fn class_match(pat: &[u8], c: Option<u8>) -> Option<(bool, &[u8])> {
    let (negate, body) = match pat.first() {
        Some(b'!') | Some(b'^') => (true, &pat[1..]),
        _ => (false, pat),
    };

    // a ']' first in the class is literal
    let close = body.iter().skip(1).position(|b| *b == b']')? + 1;
    let class = &body[..close];
    let after = &body[(close + 1)..];

    let c = match c {
        Some(c) if c != b'/' => c,
        _ => return Some((false, after)),
    };

    let mut found = false;
    let mut i = 0;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == b'-' {
            if class[i] <= c && c <= class[i + 2] {
                found = true;
            }
            i += 3;
        } else {
            if class[i] == c {
                found = true;
            }
            i += 1;
        }
    }

    Some((found != negate, after))
}
