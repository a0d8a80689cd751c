//! Async driver for a [`Connection`] over any `futures-io` transport.
//!
//! # Example
//!
//! ```rust, no_run
//! use hserve::server::{self, Served};
//! use hserve::{Config, ConnectionId, Registry};
//! use async_std::net::TcpListener;
//! use std::error::Error;
//! use std::sync::{Arc, Mutex};
//!
//! #[async_std::main]
//! async fn main() -> Result<(), Box<dyn Error>> {
//!     let listener = TcpListener::bind("127.0.0.1:3000").await?;
//!
//!     let mut registry = Registry::new();
//!     registry.add_static("/", "Hello, World!", "text/html");
//!     let registry = Arc::new(Mutex::new(registry));
//!     let config = Arc::new(Config::default());
//!
//!     let mut next_id = 0;
//!
//!     // Accept all incoming TCP connections.
//!     loop {
//!         if let Ok((socket, _peer_addr)) = listener.accept().await {
//!             next_id += 1;
//!             let id = ConnectionId(next_id);
//!             let config = config.clone();
//!             let registry = registry.clone();
//!
//!             // Spawn a new task to process each connection individually
//!             async_std::task::spawn(async move {
//!                 match server::serve(socket, id, config, registry).await {
//!                     Ok(Served::Closed) => {}
//!                     Ok(Served::Detached(_socket, _rest)) => {
//!                         // websocket frames from here on
//!                     }
//!                     Err(e) => println!("Connection failed: {}", e),
//!                 }
//!             });
//!         }
//!     }
//! }
//! ```
//!
//! A connection that neither reads nor writes for [`Config::inactivity_timeout`] is closed and
//! its held resources are released.
//!
//! [`Config::inactivity_timeout`]: ../struct.Config.html#structfield.inactivity_timeout

use crate::connection::{Connection, Outcome};
use crate::resource::{ConnectionId, Registry};
use crate::Config;
use crate::Error;
use crate::{AsyncRead, AsyncWrite};
use futures_timer::Delay;
use futures_util::future::{self, Either};
use futures_util::io::{AsyncReadExt, AsyncWriteExt};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// How a served connection ended.
pub enum Served<S> {
    /// The connection is done and the transport closed.
    Closed,
    /// A WebSocket handshake completed. The transport is handed back together with any bytes
    /// read past the handshake.
    Detached(S, Vec<u8>),
}

impl<S> fmt::Debug for Served<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Served::Closed => write!(f, "Closed"),
            Served::Detached(_, rest) => write!(f, "Detached({} bytes)", rest.len()),
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> Result<MutexGuard<'_, Registry>, Error> {
    registry
        .lock()
        .map_err(|_| Error::Application("Registry lock poisoned".into()))
}

/// Serve one connection until it closes, fails or is detached by a WebSocket upgrade.
pub async fn serve<S>(
    mut io: S,
    id: ConnectionId,
    config: Arc<Config>,
    registry: Arc<Mutex<Registry>>,
) -> Result<Served<S>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = Connection::new(id, config.clone());
    let mut buf = vec![0_u8; config.recv_buffer_size];

    loop {
        let read = {
            let timeout = Delay::new(conn.time_left(Instant::now()));
            match future::select(io.read(&mut buf), timeout).await {
                Either::Left((res, _)) => Some(res),
                Either::Right(_) => None,
            }
        };

        let amount = match read {
            Some(Ok(v)) => v,
            Some(Err(e)) => {
                conn.abort(&mut *lock(&registry)?);
                return Err(e.into());
            }
            None => {
                debug!("Inactivity timeout on {:?}", id);
                conn.abort(&mut *lock(&registry)?);
                io.close().await?;
                return Ok(Served::Closed);
            }
        };

        if amount == 0 {
            debug!("EOF from {:?}", id);
            conn.abort(&mut *lock(&registry)?);
            return Ok(Served::Closed);
        }

        let outcome = {
            let mut reg = lock(&registry)?;
            conn.feed(&mut reg, &buf[..amount])
        };

        // whatever was produced goes out, also ahead of a close
        let output = conn.take_output();
        if !output.is_empty() {
            trace!("Send {} bytes to {:?}", output.len(), id);
            io.write_all(&output).await?;
            io.flush().await?;
            conn.touch(Instant::now());
        }

        match outcome? {
            Outcome::NeedMore => {}
            Outcome::Close => {
                io.close().await?;
                return Ok(Served::Closed);
            }
            Outcome::Detached => {
                debug!("Detach {:?}", id);
                return Ok(Served::Detached(io, conn.take_unprocessed()));
            }
        }
    }
}
