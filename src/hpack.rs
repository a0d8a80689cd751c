//! Header compression for HTTP/2.

use crate::Error;
use loona_hpack::{Decoder, Encoder};
use std::fmt;

/// Header block codec used by a connection. One instance per connection since both
/// directions keep a dynamic table.
pub trait HeaderCodec: Send {
    /// Decode a complete header block, calling `on_field` for every name/value in order.
    fn decode_block(
        &mut self,
        block: &[u8],
        on_field: &mut dyn FnMut(&[u8], &[u8]),
    ) -> Result<(), Error>;

    /// Encode one header field, appending the representation to `out`.
    fn encode_header(&mut self, name: &[u8], value: &[u8], out: &mut Vec<u8>)
        -> Result<(), Error>;
}

/// [`HeaderCodec`] over `loona-hpack`.
pub struct Hpack {
    decoder: Decoder<'static>,
    encoder: Encoder<'static>,
}

impl Hpack {
    /// Codec with empty dynamic tables.
    pub fn new() -> Self {
        Hpack {
            decoder: Decoder::new(),
            encoder: Encoder::new(),
        }
    }
}

impl Default for Hpack {
    fn default() -> Self {
        Hpack::new()
    }
}

impl HeaderCodec for Hpack {
    fn decode_block(
        &mut self,
        block: &[u8],
        on_field: &mut dyn FnMut(&[u8], &[u8]),
    ) -> Result<(), Error> {
        self.decoder
            .decode_with_cb(block, |name, value| on_field(&*name, &*value))
            .map_err(|e| Error::Hpack(format!("{:?}", e)))
    }

    fn encode_header(
        &mut self,
        name: &[u8],
        value: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), Error> {
        self.encoder
            .encode_into(std::iter::once((name, value)), out)
            .map_err(|e| Error::Hpack(e.to_string()))
    }
}

impl fmt::Debug for Hpack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Hpack")
    }
}
