use std::fmt;
use std::ops::Range;

/// Outcome of capturing request headers for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// No header names are registered for capture.
    None,
    /// Every registered header present in the request was captured.
    Ok,
    /// At least one header didn't fit and was left out.
    Dropped,
}

/// Bounded store of request headers whose names were registered for capture.
///
/// Names are stored with the casing they were registered with, regardless of how the client
/// spelled them. A header that doesn't fit is skipped, later smaller ones may still fit.
pub struct HeaderCapture {
    arena: Vec<u8>,
    slots: Vec<(Range<usize>, Range<usize>)>,
    max_bytes: usize,
    max_count: usize,
    status: CaptureStatus,
}

impl HeaderCapture {
    pub(crate) fn new(max_bytes: usize, max_count: usize) -> Self {
        HeaderCapture {
            arena: Vec::with_capacity(max_bytes),
            slots: Vec::with_capacity(max_count),
            max_bytes,
            max_count,
            status: CaptureStatus::None,
        }
    }

    pub(crate) fn reset(&mut self, enabled: bool) {
        self.arena.clear();
        self.slots.clear();
        self.status = if enabled {
            CaptureStatus::Ok
        } else {
            CaptureStatus::None
        };
    }

    /// Capture `value` if `name` matches one of `registered`.
    pub(crate) fn offer(&mut self, registered: &[String], name: &[u8], value: &[u8]) {
        let reg = match registered
            .iter()
            .find(|r| r.as_bytes().eq_ignore_ascii_case(name))
        {
            Some(r) => r,
            None => return,
        };

        let value = match std::str::from_utf8(value) {
            Ok(v) => v,
            Err(_) => {
                debug!("Drop non utf-8 value of captured header: {}", reg);
                self.status = CaptureStatus::Dropped;
                return;
            }
        };

        let need = reg.len() + value.len();
        if self.slots.len() == self.max_count || self.arena.len() + need > self.max_bytes {
            warn!("Header capture full, dropping: {}", reg);
            self.status = CaptureStatus::Dropped;
            return;
        }

        let name_start = self.arena.len();
        self.arena.extend_from_slice(reg.as_bytes());
        let value_start = self.arena.len();
        self.arena.extend_from_slice(value.as_bytes());

        self.slots
            .push((name_start..value_start, value_start..self.arena.len()));
    }

    /// How capturing went for this request.
    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    /// Number of captured headers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no header was captured.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Captured `(name, value)` pairs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.slots
            .iter()
            .map(move |(n, v)| (self.text(n.clone()), self.text(v.clone())))
    }

    /// Value of a captured header, name compared case insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    fn text(&self, range: Range<usize>) -> &str {
        // only utf-8 is ever put in the arena
        std::str::from_utf8(&self.arena[range]).unwrap_or("")
    }
}

impl fmt::Debug for HeaderCapture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HeaderCapture")
            .field("status", &self.status)
            .field("headers", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}
