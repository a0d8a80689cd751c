#![no_main]
use libfuzzer_sys::fuzz_target;

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_std::io::Cursor;
use futures_io::{AsyncRead, AsyncWrite};
use hserve::{Config, ConnectionId, DataStatus, HandlerError, MethodSet, Registry};
use hserve::{RequestCtx, ResponseCtx};
use http::Method;

/// Reads the fuzz input in small pieces and swallows whatever is written.
#[derive(Clone, Debug)]
struct RwWrapper(Arc<Mutex<Cursor<Vec<u8>>>>);

impl RwWrapper {
    fn new(input: Vec<u8>) -> Self {
        Self(Arc::new(Mutex::new(Cursor::new(input))))
    }
}

impl AsyncRead for RwWrapper {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        let max = buf.len().min(7);
        Pin::new(&mut *self.0.lock().unwrap()).poll_read(cx, &mut buf[..max])
    }
}

impl AsyncWrite for RwWrapper {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn registry() -> Registry {
    let mut reg = Registry::new();
    reg.add_static("/", "Hello, World!", "text/html");
    reg.add_dynamic(
        "/dynamic",
        MethodSet::of(&[Method::GET, Method::POST, Method::PUT]),
        "text/plain",
        |status: DataStatus, _: &RequestCtx<'_>| -> Result<ResponseCtx, HandlerError> {
            match status {
                DataStatus::Final => Ok(ResponseCtx::new().with_body("done").finished()),
                _ => Ok(ResponseCtx::new()),
            }
        },
    );
    reg.add_websocket("/ws", |_: &RequestCtx<'_>| -> Result<(), HandlerError> { Ok(()) });
    reg
}

fuzz_target!(|data: &[u8]| {
    let input = data.to_vec();
    let stream = RwWrapper::new(input);
    let config = Arc::new(Config {
        recv_buffer_size: 256,
        ..Config::default()
    });
    let registry = Arc::new(Mutex::new(registry()));

    async_std::task::block_on(async move {
        hserve::server::serve(stream, ConnectionId(1), config, registry)
            .await
            .ok();
    });
});
