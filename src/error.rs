use std::fmt;
use std::io;

/// Possible errors from this crate.
///
/// Every variant is fatal for the connection it was raised on. Problems a client can be told
/// about (unknown path, unsupported method, busy resource) are answered with a response instead
/// and never surface as an `Error`.
#[derive(Debug)]
pub enum Error {
    /// Peer broke the HTTP/1.1 or HTTP/2 framing rules.
    Protocol(String),
    /// A fixed-capacity structure (receive buffer, stream table) ran out of room.
    Exhausted(String),
    /// A dynamic resource handler failed after its response head was on the wire.
    Application(String),
    /// A wrapped std::io::Error from the underlying transport (socket) or file system.
    Io(io::Error),
    /// HTTP/1.1 parse errors from the `httparse` crate.
    Http11Parser(httparse::Error),
    /// A header block could not be decoded or encoded.
    Hpack(String),
}

impl Error {
    pub(crate) fn protocol<T: Into<String>>(msg: T) -> Self {
        Error::Protocol(msg.into())
    }

    pub(crate) fn exhausted<T: Into<String>>(msg: T) -> Self {
        Error::Exhausted(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Protocol(v) => write!(f, "protocol: {}", v),
            Error::Exhausted(v) => write!(f, "exhausted: {}", v),
            Error::Application(v) => write!(f, "application: {}", v),
            Error::Io(v) => fmt::Display::fmt(v, f),
            Error::Http11Parser(v) => write!(f, "http11 parser: {}", v),
            Error::Hpack(v) => write!(f, "hpack: {}", v),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Http11Parser(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<httparse::Error> for Error {
    fn from(e: httparse::Error) -> Self {
        Error::Http11Parser(e)
    }
}
