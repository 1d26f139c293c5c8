//! Outbound translation: one aggregate message in, the frame writes for one
//! stream out.
//!
//! No I/O and no shared state. The caller submits the writes to the
//! connection's single writer in the order returned, without interleaving
//! another stream's frames into the sequence.

use bytes::Bytes;
use tracing::debug;

use crate::config::BridgeConfig;
use crate::error::StreamError;
use crate::headers;
use crate::hpack::H2Header;
use crate::message::AggregateMessage;

/// A request to put one frame on the wire.
///
/// Trailers are a second `Headers` write, always with `end_stream` set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameWrite {
    Headers {
        stream_id: u32,
        /// Pseudo-headers first, then regular headers.
        fields: Vec<H2Header>,
        end_stream: bool,
    },
    Data {
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
    },
}

impl FrameWrite {
    pub fn stream_id(&self) -> u32 {
        match self {
            Self::Headers { stream_id, .. } | Self::Data { stream_id, .. } => *stream_id,
        }
    }

    pub fn is_end_stream(&self) -> bool {
        match self {
            Self::Headers { end_stream, .. } | Self::Data { end_stream, .. } => *end_stream,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboundTranslator {
    max_frame_size: usize,
}

impl OutboundTranslator {
    /// `max_frame_size` bounds each DATA payload; zero is treated as one.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.max(1),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.max_frame_size)
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Frame writes that carry `message` on `stream_id`.
    ///
    /// The sequence is one HEADERS write, then the body cut into DATA writes
    /// of at most `max_frame_size` bytes, then a trailing HEADERS write if
    /// the message has trailers. `end_stream` is set on the last write only.
    /// Interim (1xx) responses are a single HEADERS write that leaves the
    /// stream open.
    pub fn translate(
        &self,
        message: &AggregateMessage,
        stream_id: u32,
        scheme: &str,
    ) -> Result<Vec<FrameWrite>, StreamError> {
        if stream_id == 0 {
            return Err(StreamError::StreamSequence {
                stream_id,
                reason: "stream 0 carries no messages",
            });
        }
        let block =
            headers::from_aggregate(message, scheme).map_err(|e| StreamError::header(stream_id, e))?;

        if message.is_informational() {
            debug!(stream_id, "interim response translated");
            return Ok(vec![FrameWrite::Headers {
                stream_id,
                fields: block.into_fields(),
                end_stream: false,
            }]);
        }

        headers::validate_trailers(&message.trailers).map_err(|e| StreamError::header(stream_id, e))?;
        let body = &message.body;
        let has_trailers = !message.trailers.is_empty();

        let mut writes = Vec::with_capacity(2 + body.len() / self.max_frame_size);
        writes.push(FrameWrite::Headers {
            stream_id,
            fields: block.into_fields(),
            end_stream: body.is_empty() && !has_trailers,
        });

        let mut offset = 0;
        while offset < body.len() {
            let end = body.len().min(offset.saturating_add(self.max_frame_size));
            writes.push(FrameWrite::Data {
                stream_id,
                data: body.slice(offset..end),
                end_stream: end == body.len() && !has_trailers,
            });
            offset = end;
        }

        if has_trailers {
            writes.push(FrameWrite::Headers {
                stream_id,
                fields: message.trailers.clone(),
                end_stream: true,
            });
        }

        debug!(stream_id, frames = writes.len(), body_len = body.len(), "message translated");
        Ok(writes)
    }
}

impl Default for OutboundTranslator {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}
