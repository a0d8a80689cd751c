use crate::config::Config;
use crate::dispatch::Exchange;
use crate::Error;

/// RFC 7540 stream states we distinguish. Streams we never open locally, so there is no
/// reserved or half-closed (local) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamState {
    /// Free slot.
    Idle,
    /// Peer may still send HEADERS (trailers) and DATA.
    Open,
    /// Peer sent END_STREAM, we're still answering.
    HalfClosedRemote,
    Closed,
}

#[derive(Debug)]
pub(crate) struct Stream {
    pub id: u32,
    pub state: StreamState,
    /// Receive window we granted the peer on this stream.
    pub window: i64,
    pub exchange: Exchange,
}

impl Stream {
    fn new(config: &Config) -> Self {
        Stream {
            id: 0,
            state: StreamState::Idle,
            window: config.initial_window_size as i64,
            exchange: Exchange::new(config),
        }
    }

    fn is_active(&self) -> bool {
        matches!(
            self.state,
            StreamState::Open | StreamState::HalfClosedRemote
        )
    }

    /// Whether the peer may still send DATA.
    pub fn accepts_data(&self) -> bool {
        self.is_active()
    }
}

/// Fixed number of stream slots, allocated up front.
#[derive(Debug)]
pub(crate) struct StreamTable {
    slots: Vec<Stream>,
}

impl StreamTable {
    pub fn new(config: &Config) -> Self {
        StreamTable {
            slots: (0..config.max_streams).map(|_| Stream::new(config)).collect(),
        }
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Stream> {
        if id == 0 {
            return None;
        }
        self.slots.iter_mut().find(|s| s.is_active() && s.id == id)
    }

    /// Take a free slot for stream `id`. Checking that the id is new is up to the caller.
    pub fn open(&mut self, id: u32, config: &Config) -> Result<&mut Stream, Error> {
        let stream = self
            .slots
            .iter_mut()
            .find(|s| !s.is_active())
            .ok_or_else(|| {
                Error::exhausted(format!(
                    "No free stream slot for stream {} (max {})",
                    id, config.max_streams
                ))
            })?;

        trace!("Open stream {}", id);
        stream.id = id;
        stream.state = StreamState::Open;
        stream.window = config.initial_window_size as i64;
        stream.exchange.reset(config);

        Ok(stream)
    }

    pub fn release(&mut self, id: u32) {
        if let Some(stream) = self.get_mut(id) {
            trace!("Release stream {}", id);
            stream.state = StreamState::Closed;
            stream.exchange.pending = None;
        }
    }

    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut Stream> + '_ {
        self.slots.iter_mut().filter(|s| s.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active()).count()
    }
}
