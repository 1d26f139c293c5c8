//! Per-connection arena of in-progress stream aggregations.
//!
//! Not synchronized: a connection's frame events are processed one at a
//! time on one execution context, so the table never sees concurrent
//! mutation.

use std::collections::{HashMap, HashSet};

use bytes::BytesMut;

use crate::error::StreamError;
use crate::hpack::H2Header;
use crate::message::{Role, StartLine};

/// Aggregation progress of one logical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationState {
    AwaitingHeaders,
    HeadersReceived,
    BodyReceived,
    TrailersReceived,
    Complete,
    Aborted,
}

impl AggregationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted)
    }

    /// Leading headers are in and the stream may take body or trailers.
    pub fn accepts_body(self) -> bool {
        matches!(self, Self::HeadersReceived | Self::BodyReceived)
    }
}

/// Accumulated state of one stream.
#[derive(Debug)]
pub struct LogicalStream {
    pub id: u32,
    /// Our role on this stream.
    pub role: Role,
    pub state: AggregationState,
    pub start_line: Option<StartLine>,
    pub headers: Vec<H2Header>,
    pub body: BytesMut,
    pub trailers: Vec<H2Header>,
    pub end_stream: bool,
}

impl LogicalStream {
    fn new(id: u32, role: Role) -> Self {
        Self {
            id,
            role,
            state: AggregationState::AwaitingHeaders,
            start_line: None,
            headers: Vec::new(),
            body: BytesMut::new(),
            trailers: Vec::new(),
            end_stream: false,
        }
    }
}

/// Stream id to aggregation state. At most one entry per live id.
///
/// On the responder side streams are opened by the peer's request headers,
/// which arrive in increasing id order, so an id at or below the highest one
/// seen is a closed stream and is refused. Responses reach an initiator in
/// whatever order the peer answers, so there every closed id is remembered
/// until the table is drained.
#[derive(Debug, Default)]
pub struct StreamTable {
    streams: HashMap<u32, LogicalStream>,
    /// Highest peer-opened id so far, indexed by id parity (even, odd).
    highest: [u32; 2],
    /// Initiator streams that have finished or been aborted.
    closed: HashSet<u32>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stream_id: u32) -> Option<&LogicalStream> {
        self.streams.get(&stream_id)
    }

    pub fn get_mut(&mut self, stream_id: u32) -> Option<&mut LogicalStream> {
        self.streams.get_mut(&stream_id)
    }

    /// Start tracking `stream_id`.
    pub fn create(&mut self, stream_id: u32, role: Role) -> Result<&mut LogicalStream, StreamError> {
        if self.streams.contains_key(&stream_id) {
            return Err(StreamError::DuplicateStream { stream_id });
        }
        match role {
            Role::Responder => {
                let parity = (stream_id & 1) as usize;
                if stream_id <= self.highest[parity] {
                    return Err(StreamError::DuplicateStream { stream_id });
                }
                self.highest[parity] = stream_id;
            }
            Role::Initiator => {
                if self.closed.contains(&stream_id) {
                    return Err(StreamError::DuplicateStream { stream_id });
                }
            }
        }
        Ok(self
            .streams
            .entry(stream_id)
            .or_insert_with(|| LogicalStream::new(stream_id, role)))
    }

    pub fn remove(&mut self, stream_id: u32) -> Option<LogicalStream> {
        let stream = self.streams.remove(&stream_id)?;
        if stream.role == Role::Initiator {
            self.closed.insert(stream_id);
        }
        Some(stream)
    }

    pub fn contains(&self, stream_id: u32) -> bool {
        self.streams.contains_key(&stream_id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Remove every live stream, lowest id first.
    pub fn drain(&mut self) -> Vec<LogicalStream> {
        self.closed.clear();
        let mut streams: Vec<_> = self.streams.drain().map(|(_, s)| s).collect();
        streams.sort_by_key(|s| s.id);
        streams
    }
}
