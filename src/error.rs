//! Error types.
//!
//! Everything the aggregation engine reports is stream-scoped: a
//! [`StreamError`] always names the one stream it concerns and the
//! connection carries on. Only the wire adapter produces connection-scoped
//! [`CodecError`]s, and deciding what to do about those is left to the caller.

use thiserror::Error;

use crate::h2_codec::error_code;

/// Header block could not be mapped to or from the aggregate message model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("missing mandatory pseudo-header {0}")]
    MissingPseudoHeader(&'static str),
    #[error("pseudo-header {0} after a regular header")]
    PseudoHeaderOrder(String),
    #[error("duplicate pseudo-header {0}")]
    DuplicatePseudoHeader(String),
    #[error("unexpected pseudo-header {0}")]
    UnexpectedPseudoHeader(String),
    #[error("invalid :status value {0:?}")]
    InvalidStatus(String),
    #[error("message has no {0} to send")]
    MissingStartLine(&'static str),
}

/// Failure of a single logical stream. The stream is discarded; no other
/// stream is affected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("stream {stream_id}: {source}")]
    Header {
        stream_id: u32,
        #[source]
        source: HeaderError,
    },
    #[error("stream {stream_id}: frame out of sequence: {reason}")]
    StreamSequence { stream_id: u32, reason: &'static str },
    #[error("stream {stream_id}: stream id already in use")]
    DuplicateStream { stream_id: u32 },
    #[error("stream {stream_id}: aggregated body exceeds {limit} bytes")]
    MessageTooLarge { stream_id: u32, limit: usize },
}

impl StreamError {
    pub fn stream_id(&self) -> u32 {
        match self {
            Self::Header { stream_id, .. }
            | Self::StreamSequence { stream_id, .. }
            | Self::DuplicateStream { stream_id }
            | Self::MessageTooLarge { stream_id, .. } => *stream_id,
        }
    }

    /// RST_STREAM error code to reset the offending stream with.
    pub fn error_code(&self) -> u32 {
        match self {
            Self::MessageTooLarge { .. } => error_code::CANCEL,
            _ => error_code::PROTOCOL_ERROR,
        }
    }

    pub(crate) fn header(stream_id: u32, source: HeaderError) -> Self {
        Self::Header { stream_id, source }
    }
}

/// Connection-level framing failure from the wire adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("{0} frame too short")]
    FrameTooShort(&'static str),
    #[error("invalid padding in {0} frame")]
    InvalidPadding(&'static str),
    #[error("header block too large ({size} bytes, max {max})")]
    HeaderBlockTooLarge { size: usize, max: usize },
    #[error("CONTINUATION for stream {stream_id} but pending headers on stream {pending}")]
    ContinuationMismatch { stream_id: u32, pending: u32 },
    #[error("unexpected CONTINUATION frame for stream {0}")]
    UnexpectedContinuation(u32),
    #[error("frame type {frame_type:#x} inside the open header block of stream {pending}")]
    ExpectedContinuation { pending: u32, frame_type: u8 },
    #[error("{0} frame on stream 0")]
    ZeroStreamId(&'static str),
    #[error("HPACK decode error: {0}")]
    Hpack(String),
}
