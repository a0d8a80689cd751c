//! Turning responses into wire bytes, either HTTP/1.1 text or HTTP/2 frames.

use crate::frame;
use crate::hpack::HeaderCodec;
use crate::resource::{DataStatus, ResponseCtx};
use crate::Error;
use std::io::Write;

/// Progress of the response of one exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ResponseState {
    pub headers_sent: bool,
    pub end_sent: bool,
}

/// Sink for one response. Callers send the head exactly once, before any data.
pub(crate) trait Compose {
    /// Response head for a body of not yet known length.
    fn head(&mut self, status: u16, headers: &[(&str, &str)], end: bool) -> Result<(), Error>;

    /// Response head for a body of `len` bytes.
    fn head_sized(&mut self, status: u16, headers: &[(&str, &str)], len: u64)
        -> Result<(), Error>;

    fn data(&mut self, data: &[u8], end: bool) -> Result<(), Error>;

    /// End a response whose head went out without `end`, and no data carried it either.
    fn finish(&mut self) -> Result<(), Error>;

    /// Complete 404 response.
    fn not_found(&mut self) -> Result<(), Error> {
        self.head_sized(404, &[], 0)
    }
}

/// HTTP/1.1 responses. Bodies of unknown length use chunked transfer coding.
pub(crate) struct H1Out<'a> {
    out: &'a mut Vec<u8>,
    sized: bool,
}

impl<'a> H1Out<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        H1Out { out, sized: false }
    }
}

#[allow(clippy::write_with_newline)]
impl<'a> Compose for H1Out<'a> {
    fn head(&mut self, status: u16, headers: &[(&str, &str)], end: bool) -> Result<(), Error> {
        let start = self.out.len();
        write!(self.out, "HTTP/1.1 {}\r\nTransfer-Encoding: chunked\r\n", status)?;
        for (name, value) in headers {
            write!(self.out, "{}: {}\r\n", name, value)?;
        }
        write!(self.out, "\r\n")?;
        debug!(
            "write_http11_res: {:?}",
            String::from_utf8_lossy(&self.out[start..])
        );
        if end {
            self.finish()?;
        }
        Ok(())
    }

    fn head_sized(
        &mut self,
        status: u16,
        headers: &[(&str, &str)],
        len: u64,
    ) -> Result<(), Error> {
        let start = self.out.len();
        let reason = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown");
        write!(self.out, "HTTP/1.1 {} {}\r\n", status, reason)?;
        for (name, value) in headers {
            write!(self.out, "{}: {}\r\n", name, value)?;
        }
        write!(self.out, "Content-Length: {}\r\n\r\n", len)?;
        debug!(
            "write_http11_res: {:?}",
            String::from_utf8_lossy(&self.out[start..])
        );
        self.sized = true;
        Ok(())
    }

    fn data(&mut self, data: &[u8], end: bool) -> Result<(), Error> {
        if self.sized {
            self.out.extend_from_slice(data);
            return Ok(());
        }
        if !data.is_empty() {
            write!(self.out, "{:x}\r\n", data.len())?;
            self.out.extend_from_slice(data);
            write!(self.out, "\r\n")?;
        }
        if end {
            self.finish()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        if !self.sized {
            self.out.extend_from_slice(b"0\r\n\r\n");
        }
        Ok(())
    }
}

/// HTTP/2 responses on one stream.
pub(crate) struct H2Out<'a> {
    out: &'a mut Vec<u8>,
    codec: &'a mut dyn HeaderCodec,
    stream_id: u32,
    max_frame: usize,
}

impl<'a> H2Out<'a> {
    pub fn new(
        out: &'a mut Vec<u8>,
        codec: &'a mut dyn HeaderCodec,
        stream_id: u32,
        max_frame: usize,
    ) -> Self {
        H2Out {
            out,
            codec,
            stream_id,
            max_frame,
        }
    }
}

impl<'a> Compose for H2Out<'a> {
    fn head(&mut self, status: u16, headers: &[(&str, &str)], end: bool) -> Result<(), Error> {
        let mut block = Vec::with_capacity(64);
        self.codec
            .encode_header(b":status", status.to_string().as_bytes(), &mut block)?;
        for (name, value) in headers {
            let name = name.to_ascii_lowercase();
            self.codec
                .encode_header(name.as_bytes(), value.as_bytes(), &mut block)?;
        }
        debug!(
            "Response stream: {} status: {} headers: {:?}",
            self.stream_id, status, headers
        );
        frame::write_headers(self.out, self.stream_id, &block, end);
        Ok(())
    }

    fn head_sized(
        &mut self,
        status: u16,
        headers: &[(&str, &str)],
        len: u64,
    ) -> Result<(), Error> {
        self.head(status, headers, len == 0)
    }

    fn data(&mut self, data: &[u8], end: bool) -> Result<(), Error> {
        frame::write_data(self.out, self.stream_id, data, end, self.max_frame);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        frame::write_data(self.out, self.stream_id, &[], true, self.max_frame);
        Ok(())
    }

    // peers expect the stream of a 404 to end with an (empty) DATA frame
    fn not_found(&mut self) -> Result<(), Error> {
        self.head(404, &[], false)?;
        self.finish()
    }
}

/// Reply with a bodyless error status.
pub(crate) fn send_status(
    out: &mut dyn Compose,
    state: &mut ResponseState,
    status: u16,
) -> Result<(), Error> {
    out.head_sized(status, &[], 0)?;
    state.headers_sent = true;
    state.end_sent = true;
    Ok(())
}

/// Serialize one answer of a dynamic handler. `status` is what the handler was invoked
/// with, it decides whether the answer can be final.
pub(crate) fn send_dynamic(
    out: &mut dyn Compose,
    state: &mut ResponseState,
    rsp: &ResponseCtx,
    status: DataStatus,
    default_content_type: Option<&str>,
) -> Result<(), Error> {
    let is_final = rsp.is_final(status);

    if state.end_sent {
        if rsp.is_provided() {
            warn!("Response already ended, dropping answer");
        }
        return Ok(());
    }

    if state.headers_sent {
        if rsp.status.is_some() || !rsp.headers.is_empty() {
            warn!("Response headers already sent, dropping status and headers");
        }
    } else if rsp.is_provided() || is_final {
        let code = rsp.status.unwrap_or(200);
        if !(100..=599).contains(&code) {
            return Err(Error::Application(format!("Invalid status code: {}", code)));
        }

        let mut headers: Vec<(&str, &str)> = Vec::with_capacity(rsp.headers.len() + 1);
        for (name, value) in &rsp.headers {
            if name.eq_ignore_ascii_case("transfer-encoding") {
                return Err(Error::Application(
                    "Handler may not set transfer-encoding".into(),
                ));
            }
            headers.push((name.as_str(), value.as_str()));
        }

        let has_content_type = headers
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case("content-type"));
        if let (false, Some(ct)) = (has_content_type, default_content_type) {
            headers.push(("Content-Type", ct));
        }

        let end = is_final && rsp.body.is_empty();
        out.head(code, &headers, end)?;
        state.headers_sent = true;
        state.end_sent = end;
    }

    if !rsp.body.is_empty() {
        out.data(&rsp.body, is_final)?;
        state.end_sent = is_final;
    } else if is_final && !state.end_sent {
        out.finish()?;
        state.end_sent = true;
    }

    Ok(())
}
