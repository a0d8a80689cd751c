mod common;

use common::*;
use hserve::{Config, Connection, ConnectionId, DataStatus, Error, HandlerError, MethodSet};
use hserve::{Outcome, RequestCtx, ResponseCtx};
use http::Method;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const STATIC_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 13\r\n\r\nHello, World!";

const DYNAMIC_GET_RESPONSE: &[u8] = b"HTTP/1.1 200\r\nTransfer-Encoding: chunked\r\n\
      Content-Type: text/plain\r\n\r\n10\r\nTest dynamic GET\r\n0\r\n\r\n";

const EMPTY_DYNAMIC_RESPONSE: &[u8] =
    b"HTTP/1.1 200\r\nTransfer-Encoding: chunked\r\nContent-Type: text/plain\r\n\r\n0\r\n\r\n";

fn text(out: &[u8]) -> String {
    String::from_utf8_lossy(out).to_string()
}

#[test]
fn get_static() {
    let (mut reg, _) = registry();
    let mut conn = connection();

    let (res, out) = feed(&mut conn, &mut reg, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert_eq!(text(&out), text(STATIC_RESPONSE));
    assert!(!conn.is_http2());
}

#[test]
fn get_static_byte_by_byte() {
    let (mut reg, _) = registry();
    let mut conn = connection();

    let req = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
    let mut out = vec![];
    for b in req.iter() {
        let (res, mut o) = feed(&mut conn, &mut reg, &[*b]);
        assert_eq!(res.unwrap(), Outcome::NeedMore);
        out.append(&mut o);
    }
    assert_eq!(text(&out), text(STATIC_RESPONSE));
}

#[test]
fn get_dynamic_is_chunked() {
    let (mut reg, seen) = registry();
    let mut conn = connection();

    let (res, out) = feed(&mut conn, &mut reg, b"GET /dynamic?x=1 HTTP/1.1\r\n\r\n");
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert_eq!(text(&out), text(DYNAMIC_GET_RESPONSE));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.calls, vec![DataStatus::Final]);
    assert_eq!(seen.queries, vec!["x=1".to_string()]);
}

#[test]
fn post_content_length() {
    let (mut reg, seen) = registry();
    let mut conn = connection();

    let (res, out) = feed(
        &mut conn,
        &mut reg,
        b"POST /dynamic HTTP/1.1\r\nContent-Length: 17\r\n\r\nTest ",
    );
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert!(out.is_empty());

    let (res, out) = feed(&mut conn, &mut reg, b"dynamic POST");
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert_eq!(text(&out), text(EMPTY_DYNAMIC_RESPONSE));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.body, DYNAMIC_POST_PAYLOAD);
    assert_eq!(seen.calls, vec![DataStatus::More, DataStatus::Final]);
    assert_eq!(reg.holder(reg.lookup("/dynamic").unwrap()), None);
}

#[test]
fn post_chunked() {
    let (mut reg, seen) = registry();
    let mut conn = connection();

    let req = b"POST /dynamic HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
        5\r\nTest \r\nc\r\ndynamic POST\r\n0\r\n\r\n";
    let (res, out) = feed(&mut conn, &mut reg, req);
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert_eq!(text(&out), text(EMPTY_DYNAMIC_RESPONSE));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.body, DYNAMIC_POST_PAYLOAD);
    assert_eq!(
        seen.calls,
        vec![DataStatus::More, DataStatus::More, DataStatus::Final]
    );
}

#[test]
fn post_chunked_with_trailer() {
    let (mut reg, seen) = registry();
    let mut conn = connection();

    let req = b"POST /dynamic HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
        11\r\nTest dynamic POST\r\n0\r\nX-Trailer: yes\r\n\r\n";
    let (res, out) = feed(&mut conn, &mut reg, req);
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert_eq!(text(&out), text(EMPTY_DYNAMIC_RESPONSE));
    assert_eq!(seen.lock().unwrap().body, DYNAMIC_POST_PAYLOAD);
}

#[test]
fn bad_chunk_size() {
    let (mut reg, _) = registry();
    let mut conn = connection();

    let req = b"POST /dynamic HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n";
    let (res, _) = feed(&mut conn, &mut reg, req);
    assert!(matches!(res, Err(Error::Protocol(_))));
}

#[test]
fn delete_dynamic() {
    let (mut reg, _) = registry();
    let mut conn = connection();

    let (res, out) = feed(&mut conn, &mut reg, b"DELETE /dynamic HTTP/1.1\r\n\r\n");
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert_eq!(text(&out), text(EMPTY_DYNAMIC_RESPONSE));
}

#[test]
fn keep_alive_pipelined() {
    let (mut reg, _) = registry();
    let mut conn = connection();

    let req = b"GET / HTTP/1.1\r\n\r\nGET /dynamic HTTP/1.1\r\n\r\n";
    let (res, out) = feed(&mut conn, &mut reg, req);
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert_eq!(text(&out), text(&cat(&[STATIC_RESPONSE, DYNAMIC_GET_RESPONSE])));
}

#[test]
fn connection_close() {
    let (mut reg, _) = registry();
    let mut conn = connection();

    let (res, out) = feed(
        &mut conn,
        &mut reg,
        b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(res.unwrap(), Outcome::Close);
    assert_eq!(text(&out), text(STATIC_RESPONSE));
}

#[test]
fn http10_closes_by_default() {
    let (mut reg, _) = registry();

    let mut conn = connection();
    let (res, _) = feed(&mut conn, &mut reg, b"GET / HTTP/1.0\r\n\r\n");
    assert_eq!(res.unwrap(), Outcome::Close);

    let mut conn = connection();
    let (res, _) = feed(
        &mut conn,
        &mut reg,
        b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n",
    );
    assert_eq!(res.unwrap(), Outcome::NeedMore);
}

#[test]
fn not_found() {
    let (mut reg, _) = registry();
    let mut conn = connection();

    let (res, out) = feed(&mut conn, &mut reg, b"GET /nope HTTP/1.1\r\n\r\n");
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert_eq!(
        text(&out),
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n"
    );
}

#[test]
fn method_not_allowed_skips_body() {
    let (mut reg, _) = registry();
    let mut conn = connection();

    let req = b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nbodyGET / HTTP/1.1\r\n\r\n";
    let (res, out) = feed(&mut conn, &mut reg, req);
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    let expected = cat(&[
        b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n",
        STATIC_RESPONSE,
    ]);
    assert_eq!(text(&out), text(&expected));
}

#[test]
fn url_too_long() {
    let (mut reg, _) = registry();
    let mut conn = connection_with(Config {
        max_url_len: 16,
        ..Config::default()
    });

    let (res, out) = feed(
        &mut conn,
        &mut reg,
        b"GET /a/rather/long/path/indeed HTTP/1.1\r\n\r\n",
    );
    assert_eq!(res.unwrap(), Outcome::Close);
    assert_eq!(
        text(&out),
        "HTTP/1.1 414 URI Too Long\r\nContent-Length: 0\r\n\r\n"
    );
}

#[test]
fn head_larger_than_buffer() {
    let (mut reg, _) = registry();
    let mut conn = connection_with(Config {
        recv_buffer_size: 64,
        ..Config::default()
    });

    let req = format!("GET / HTTP/1.1\r\nX-Filler: {}\r\n\r\n", "a".repeat(100));
    let (res, out) = feed(&mut conn, &mut reg, req.as_bytes());
    assert!(matches!(res, Err(Error::Exhausted(_))));
    assert!(out.is_empty());
}

#[test]
fn garbage_is_an_error() {
    let (mut reg, _) = registry();
    let mut conn = connection();

    let (res, _) = feed(&mut conn, &mut reg, b"\x01\x02\x03 nope\r\n\r\n");
    assert!(res.is_err());
}

#[test]
fn busy_across_connections() {
    let (mut reg, seen) = registry();
    let mut a = connection();
    let mut b = Connection::new(ConnectionId(2), Arc::new(Config::default()));

    let post = b"POST /dynamic HTTP/1.1\r\nContent-Length: 17\r\n\r\n";
    let (res, _) = feed(&mut a, &mut reg, post);
    res.unwrap();

    let (res, out) = feed(&mut b, &mut reg, &cat(&[post, DYNAMIC_POST_PAYLOAD]));
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert_eq!(text(&out), "HTTP/1.1 409 Conflict\r\nContent-Length: 0\r\n\r\n");

    let (res, out) = feed(&mut a, &mut reg, DYNAMIC_POST_PAYLOAD);
    res.unwrap();
    assert_eq!(text(&out), text(EMPTY_DYNAMIC_RESPONSE));

    // released, b gets through now
    let (res, out) = feed(&mut b, &mut reg, &cat(&[post, DYNAMIC_POST_PAYLOAD]));
    res.unwrap();
    assert_eq!(text(&out), text(EMPTY_DYNAMIC_RESPONSE));

    assert_eq!(
        seen.lock().unwrap().body,
        cat(&[DYNAMIC_POST_PAYLOAD, DYNAMIC_POST_PAYLOAD])
    );
}

#[test]
fn dropped_connection_aborts_held_resource() {
    let (mut reg, seen) = registry();
    let mut conn = connection();

    let (res, _) = feed(
        &mut conn,
        &mut reg,
        b"POST /dynamic HTTP/1.1\r\nContent-Length: 17\r\n\r\nTest",
    );
    res.unwrap();

    conn.abort(&mut reg);

    assert_eq!(
        seen.lock().unwrap().calls,
        vec![DataStatus::More, DataStatus::Aborted]
    );
    assert_eq!(reg.holder(reg.lookup("/dynamic").unwrap()), None);

    let (res, _) = feed(&mut conn, &mut reg, b"GET / HTTP/1.1\r\n\r\n");
    assert_eq!(res.unwrap(), Outcome::Close);
}

#[test]
fn handler_error_after_head_is_fatal() {
    let (mut reg, _) = registry();
    let mut calls = 0;
    reg.add_dynamic(
        "/flaky",
        MethodSet::of(&[Method::GET]),
        "text/plain",
        move |_: DataStatus, _: &RequestCtx<'_>| -> Result<ResponseCtx, HandlerError> {
            calls += 1;
            if calls == 1 {
                Ok(ResponseCtx::new().with_body("start"))
            } else {
                Err("gone".into())
            }
        },
    );
    let mut conn = connection();

    let (res, out) = feed(&mut conn, &mut reg, b"GET /flaky HTTP/1.1\r\n\r\n");
    assert!(matches!(res, Err(Error::Application(_))));
    assert!(text(&out).starts_with("HTTP/1.1 200\r\n"));
    assert_eq!(reg.holder(reg.lookup("/flaky").unwrap()), None);
}

#[test]
fn invalid_handler_status_is_internal_error() {
    let (mut reg, _) = registry();
    reg.add_dynamic(
        "/odd",
        MethodSet::of(&[Method::GET]),
        "text/plain",
        |_: DataStatus, _: &RequestCtx<'_>| -> Result<ResponseCtx, HandlerError> {
            Ok(ResponseCtx::new().with_status(1000).finished())
        },
    );
    let mut conn = connection();

    let (res, out) = feed(&mut conn, &mut reg, b"GET /odd HTTP/1.1\r\n\r\n");
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert_eq!(
        text(&out),
        "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n"
    );
}

#[test]
fn h2c_upgrade() {
    let (mut reg, _) = registry();
    let mut conn = connection();

    let req = b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade, HTTP2-Settings\r\n\
        Upgrade: h2c\r\nHTTP2-Settings: AAMAAABkAARAAAAAAAIAAAAA\r\n\r\n";
    let (res, out) = feed(&mut conn, &mut reg, req);
    assert_eq!(res.unwrap(), Outcome::NeedMore);

    let switching = b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: h2c\r\n\r\n";
    assert!(out.starts_with(switching));

    let f = frames(&out[switching.len()..]);
    assert_eq!(f.len(), 3);
    assert_eq!(f[0].kind(), 0x4);
    assert_eq!((f[1].kind(), f[1].stream_id()), (0x1, 1));
    let headers = ClientHpack::new().decode(&f[1].payload);
    assert_eq!(header(&headers, ":status"), Some("200"));
    assert_eq!((f[2].kind(), f[2].stream_id()), (0x0, 1));
    assert_eq!(f[2].payload, STATIC_PAYLOAD);

    // the client preface still follows, our SETTINGS went out already
    let (res, out) = feed(&mut conn, &mut reg, &cat(&[PREFACE, SETTINGS]));
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert!(conn.is_http2());
    assert_eq!(out, SETTINGS_ACK);

    let (res, out) = feed(&mut conn, &mut reg, HEADERS_GET_ROOT);
    res.unwrap();
    assert_eq!(frames(&out).len(), 2);
}

#[test]
fn h2c_upgrade_with_body() {
    let (mut reg, seen) = registry();
    let mut conn = connection();

    let req = cat(&[
        b"POST /dynamic HTTP/1.1\r\nConnection: Upgrade, HTTP2-Settings\r\n\
        Upgrade: h2c\r\nHTTP2-Settings: AAMAAABkAARAAAAAAAIAAAAA\r\nContent-Length: 17\r\n\r\n",
        DYNAMIC_POST_PAYLOAD,
        PREFACE,
        SETTINGS,
    ]);
    let (res, out) = feed(&mut conn, &mut reg, &req);
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert!(conn.is_http2());

    let at = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    let f = frames(&out[at..]);
    let kinds: Vec<(u8, u32)> = f.iter().map(|f| (f.kind(), f.stream_id())).collect();
    // the body came over HTTP/1.1, no window to give back
    assert_eq!(kinds, vec![(0x4, 0), (0x1, 1), (0x4, 0)]);
    assert_eq!(f[1].flags(), 0x5);

    assert_eq!(seen.lock().unwrap().body, DYNAMIC_POST_PAYLOAD);
}

#[test]
fn h2c_upgrade_with_body_over_initial_window() {
    let (mut reg, seen) = registry();
    let mut conn = connection();

    let body = vec![b'x'; 70_000];
    let req = cat(&[
        b"POST /dynamic HTTP/1.1\r\nConnection: Upgrade, HTTP2-Settings\r\n\
        Upgrade: h2c\r\nHTTP2-Settings: AAMAAABkAARAAAAAAAIAAAAA\r\nContent-Length: 70000\r\n\r\n",
        &body[..],
        PREFACE,
        SETTINGS,
    ]);
    let (res, out) = feed(&mut conn, &mut reg, &req);
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert!(conn.is_http2());

    let at = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    let kinds: Vec<u8> = frames(&out[at..]).iter().map(|f| f.kind()).collect();
    assert_eq!(kinds, vec![0x4, 0x1, 0x4]);

    assert_eq!(seen.lock().unwrap().body, body);
}

#[test]
fn h2c_upgrade_needs_preface() {
    let (mut reg, _) = registry();
    let mut conn = connection();

    let req = b"GET / HTTP/1.1\r\nConnection: Upgrade, HTTP2-Settings\r\nUpgrade: h2c\r\n\r\n";
    let (res, _) = feed(&mut conn, &mut reg, req);
    res.unwrap();

    let (res, _) = feed(&mut conn, &mut reg, b"GET / HTTP/1.1\r\n\r\n");
    assert!(matches!(res, Err(Error::Protocol(_))));
}

#[test]
fn h2c_upgrade_with_chunked_body() {
    let (mut reg, _) = registry();
    let mut conn = connection();

    let req = b"POST /dynamic HTTP/1.1\r\nConnection: Upgrade\r\nUpgrade: h2c\r\n\
        Transfer-Encoding: chunked\r\n\r\n";
    let (res, out) = feed(&mut conn, &mut reg, req);
    assert!(matches!(res, Err(Error::Protocol(_))));
    assert!(out.is_empty());
}

fn ws_registry() -> (hserve::Registry, Arc<Mutex<Vec<String>>>) {
    let (mut reg, _) = registry();
    let upgrades = Arc::new(Mutex::new(vec![]));
    let upgrades2 = upgrades.clone();
    reg.add_websocket(
        "/ws",
        move |req: &RequestCtx<'_>| -> Result<(), HandlerError> {
            upgrades2.lock().unwrap().push(req.url.to_string());
            Ok(())
        },
    );
    reg.add_websocket(
        "/ws-refuse",
        |_: &RequestCtx<'_>| -> Result<(), HandlerError> { Err("no thanks".into()) },
    );
    (reg, upgrades)
}

const WS_UPGRADE: &[u8] = b"GET /ws?room=1 HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\n\
    Connection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
    Sec-WebSocket-Version: 13\r\n\r\n";

#[test]
fn websocket_upgrade_detaches() {
    let (mut reg, upgrades) = ws_registry();
    let mut conn = connection();

    let frame_bytes = b"\x81\x85\x37\xfa\x21\x3d\x7f\x9f\x4d\x51\x58";
    let (res, out) = feed(&mut conn, &mut reg, &cat(&[WS_UPGRADE, frame_bytes]));
    assert_eq!(res.unwrap(), Outcome::Detached);
    assert_eq!(
        text(&out),
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"
    );
    assert_eq!(*upgrades.lock().unwrap(), vec!["/ws?room=1".to_string()]);

    // later input is not processed either
    let (res, out) = feed(&mut conn, &mut reg, b"more");
    assert_eq!(res.unwrap(), Outcome::Detached);
    assert!(out.is_empty());

    assert_eq!(conn.take_unprocessed(), cat(&[frame_bytes, b"more"]));
}

#[test]
fn websocket_upgrade_failures() {
    let cases: &[(&[u8], &str)] = &[
        (
            b"GET /nope HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n",
        ),
        (
            b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n",
            "HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n",
        ),
        (
            b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
            "HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n",
        ),
        (
            b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 8\r\n\r\n",
            "HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n",
        ),
        (
            b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Key: not-base64!\r\nSec-WebSocket-Version: 13\r\n\r\n",
            "HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n",
        ),
        (
            // valid base64, but not 16 bytes
            b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Key: c2hvcnQ=\r\nSec-WebSocket-Version: 13\r\n\r\n",
            "HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n",
        ),
        (
            b"GET /ws-refuse HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n",
        ),
    ];

    for (req, expected) in cases {
        let (mut reg, upgrades) = ws_registry();
        let mut conn = connection();

        let (res, out) = feed(&mut conn, &mut reg, req);
        assert_eq!(res.unwrap(), Outcome::Close);
        assert_eq!(text(&out), *expected, "{}", text(req));
        assert!(upgrades.lock().unwrap().is_empty());
    }
}

#[test]
fn websocket_resource_without_upgrade() {
    let (mut reg, _) = ws_registry();
    let mut conn = connection();

    let (res, out) = feed(&mut conn, &mut reg, b"GET /ws HTTP/1.1\r\n\r\n");
    assert_eq!(res.unwrap(), Outcome::NeedMore);
    assert_eq!(text(&out), "HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n");
}

#[test]
fn captured_headers() {
    let (mut reg, seen) = registry();
    let mut conn = connection_with(Config {
        capture_headers: vec!["User-Agent".into()],
        ..Config::default()
    });

    let req = b"GET /dynamic HTTP/1.1\r\nuser-agent: curl/7.68.0\r\nAccept: */*\r\n\r\n";
    let (res, _) = feed(&mut conn, &mut reg, req);
    res.unwrap();

    assert_eq!(
        seen.lock().unwrap().headers,
        vec![("User-Agent".to_string(), "curl/7.68.0".to_string())]
    );

    // captures don't carry over to the next request
    let (res, _) = feed(&mut conn, &mut reg, b"GET /dynamic HTTP/1.1\r\n\r\n");
    res.unwrap();
    assert!(seen.lock().unwrap().headers.is_empty());
}

#[test]
fn inactivity() {
    let mut conn = connection_with(Config {
        inactivity_timeout: Duration::from_secs(10),
        ..Config::default()
    });

    let start = Instant::now();
    conn.touch(start);
    assert!(!conn.expired(start + Duration::from_secs(9)));
    assert_eq!(
        conn.time_left(start + Duration::from_secs(4)),
        Duration::from_secs(6)
    );
    assert!(conn.expired(start + Duration::from_secs(10)));
    assert_eq!(
        conn.time_left(start + Duration::from_secs(30)),
        Duration::from_secs(0)
    );

    conn.touch(start + Duration::from_secs(20));
    assert!(!conn.expired(start + Duration::from_secs(25)));
}
