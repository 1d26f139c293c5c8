//! Header fields and HPACK (RFC 7541) for the wire adapter.
//!
//! `H2Header` is the single name/value pair type used by every header list in
//! the crate: pseudo-header sets, regular headers, trailers and the header
//! list of an [`AggregateMessage`](crate::AggregateMessage). Names keep the
//! case they arrived with; duplicates are kept as repeated entries.

use crate::error::CodecError;

/// A single header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H2Header {
    pub name: String,
    pub value: String,
}

impl H2Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// True for reserved `:`-prefixed fields (`:method`, `:status`, ...).
    pub fn is_pseudo(&self) -> bool {
        self.name.starts_with(':')
    }

    /// ASCII case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Value of the first header called `name`, compared case-insensitively.
pub fn find_header<'a>(headers: &'a [H2Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.is_named(name))
        .map(|h| h.value.as_str())
}

/// HPACK decoder for HTTP/2 header blocks.
/// Holds the peer's dynamic table, so one decoder per connection.
pub struct HpackDecoder {
    inner: fluke_hpack::Decoder<'static>,
}

impl std::fmt::Debug for HpackDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackDecoder").finish()
    }
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Decoder::new(),
        }
    }

    /// Decode a complete header block, preserving field order.
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<H2Header>, CodecError> {
        let pairs = self
            .inner
            .decode(block)
            .map_err(|e| CodecError::Hpack(format!("{:?}", e)))?;
        Ok(pairs
            .into_iter()
            .map(|(name, value)| {
                H2Header::new(
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect())
    }
}

/// HPACK encoder for HTTP/2 header blocks.
/// Holds our dynamic table, so one encoder per connection.
pub struct HpackEncoder {
    inner: fluke_hpack::Encoder<'static>,
}

impl std::fmt::Debug for HpackEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackEncoder").finish()
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackEncoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Encoder::new(),
        }
    }

    pub fn encode(&mut self, headers: &[H2Header]) -> Vec<u8> {
        let pairs: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|h| (h.name.as_bytes(), h.value.as_bytes()))
            .collect();
        self.inner.encode(pairs)
    }
}
