use std::time::Duration;

/// Size of the per-connection receive buffer.
const RECV_BUF_SIZE: usize = 1024;

/// Per-connection tunables. One instance is usually shared by every connection of a server
/// through an `Arc`.
///
/// ```
/// use hserve::Config;
///
/// let config = Config {
///     max_streams: 4,
///     capture_headers: vec!["User-Agent".into()],
///     ..Config::default()
/// };
/// assert_eq!(config.initial_window_size, 65_535);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of the fixed receive buffer. A request head, or an HTTP/2 header block
    /// including its CONTINUATION frames, must fit in here.
    pub recv_buffer_size: usize,
    /// Max number of concurrently open HTTP/2 streams per connection. Also announced to the
    /// peer as `SETTINGS_MAX_CONCURRENT_STREAMS`.
    pub max_streams: u32,
    /// Flow control window, restored after every consumed DATA frame.
    pub initial_window_size: u32,
    /// Largest DATA payload we send in one frame.
    pub max_frame_size: usize,
    /// Longest accepted request target. Longer ones are answered with 414.
    pub max_url_len: usize,
    /// Names of request headers to capture and hand to dynamic resources.
    pub capture_headers: Vec<String>,
    /// Bytes available for captured header names and values per request.
    pub capture_buffer_size: usize,
    /// Max number of captured headers per request.
    pub capture_header_count: usize,
    /// A connection without reads or writes for this long is closed.
    pub inactivity_timeout: Duration,
    /// Serve pre-compressed siblings (`.br`, `.gz`, ...) from file system resources.
    pub compression: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            recv_buffer_size: RECV_BUF_SIZE,
            max_streams: 10,
            initial_window_size: 65_535,
            max_frame_size: 16_384,
            max_url_len: 256,
            capture_headers: vec![],
            capture_buffer_size: 256,
            capture_header_count: 8,
            inactivity_timeout: Duration::from_secs(10),
            compression: true,
        }
    }
}
