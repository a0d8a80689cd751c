//! WebSocket opening handshake. After the 101 the connection is detached and the caller gets
//! the transport back; frames are not handled here.

use crate::compose::{send_status, H1Out};
use crate::connection::{Connection, State, Step};
use crate::resource::{Detail, Registry};
use crate::Error;
use base64::Engine;
use sha1::{Digest, Sha1};
use std::io::Write;

/// Appended to the client key before hashing (RFC 6455 section 1.3).
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version there is (RFC 6455 section 4.1).
const WS_VERSION: &str = "13";

/// `Sec-WebSocket-Accept` value for a client's `Sec-WebSocket-Key`.
///
/// ```
/// assert_eq!(
///     hserve::websocket::accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// A key is 16 random bytes, base64 encoded.
fn valid_key(key: &str) -> bool {
    match base64::engine::general_purpose::STANDARD.decode(key) {
        Ok(v) => v.len() == 16,
        Err(_) => false,
    }
}

impl Connection {
    pub(crate) fn upgrade_websocket(
        &mut self,
        registry: &mut Registry,
        key: Option<&str>,
        version: Option<&str>,
    ) -> Result<Step, Error> {
        let head = &self.h1.exchange.head;

        let id = registry.lookup(&head.url).filter(|id| {
            matches!(
                registry.get(*id).map(|r| &r.detail),
                Some(Detail::Websocket { .. })
            )
        });

        let key = key.filter(|k| valid_key(k));
        let version_ok = version == Some(WS_VERSION);

        let (id, key) = match (id, key) {
            (Some(id), Some(key)) if version_ok => (id, key),
            (None, _) => {
                debug!("No websocket resource for: {}", head.url);
                let mut out = H1Out::new(&mut self.out);
                send_status(&mut out, &mut self.h1.exchange.response, 404)?;
                self.state = State::Done;
                return Ok(Step::Continue);
            }
            (Some(_), _) => {
                debug!(
                    "Bad websocket handshake, key: {:?} version: {:?}",
                    key, version
                );
                let mut out = H1Out::new(&mut self.out);
                send_status(&mut out, &mut self.h1.exchange.response, 400)?;
                self.state = State::Done;
                return Ok(Step::Continue);
            }
        };

        let ctx = head.ctx(self.id, 0, &[]);
        if let Err(e) = registry.notify_upgrade(id, &ctx) {
            warn!("Websocket handler refused {}: {}", head.url, e);
            let mut out = H1Out::new(&mut self.out);
            send_status(&mut out, &mut self.h1.exchange.response, 500)?;
            self.state = State::Done;
            return Ok(Step::Continue);
        }

        write!(
            self.out,
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            accept_key(key)
        )?;

        debug!("Websocket upgrade of {:?} on {}", self.id, head.url);
        self.state = State::Detached;

        Ok(Step::Continue)
    }
}
