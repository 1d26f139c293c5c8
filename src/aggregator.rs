//! Inbound aggregation: frame events in, complete messages out.
//!
//! Each stream runs its own state machine
//! (`AwaitingHeaders -> HeadersReceived -> BodyReceived -> TrailersReceived
//! -> Complete`, or `Aborted` from any live state). Events for different
//! streams interleave freely. A failure on one stream discards only that
//! stream's state.
//!
//! Results are queued as [`AggregateEvent`]s and drained with
//! [`InboundAggregator::poll_event`]. A `Cancelled` event is queued exactly
//! when live state is thrown away, so a failed or reset stream produces a
//! cancellation instead of a message, never a partial message.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::config::BridgeConfig;
use crate::error::StreamError;
use crate::headers::{self, HeaderBlock};
use crate::hpack::H2Header;
use crate::message::{AggregateMessage, Direction, Role, StartLine};
use crate::table::{AggregationState, LogicalStream, StreamTable};

/// Why a stream's aggregation was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cancellation {
    /// The peer or the surrounding layer reset the stream.
    Reset { error_code: u32 },
    /// The stream violated the protocol or a limit.
    Failed(StreamError),
    /// The connection went away with the stream still open.
    ConnectionClosed,
}

/// Output of the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateEvent {
    /// A finished message, or an interim (1xx) response. The caller owns it.
    Message {
        stream_id: u32,
        message: AggregateMessage,
    },
    Cancelled {
        stream_id: u32,
        reason: Cancellation,
    },
}

impl AggregateEvent {
    pub fn stream_id(&self) -> u32 {
        match self {
            Self::Message { stream_id, .. } | Self::Cancelled { stream_id, .. } => *stream_id,
        }
    }
}

/// Per-connection inbound aggregation engine.
#[derive(Debug)]
pub struct InboundAggregator {
    role: Role,
    max_body: usize,
    table: StreamTable,
    events: VecDeque<AggregateEvent>,
}

impl InboundAggregator {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            role: config.role,
            max_body: config.max_aggregate_body_size,
            table: StreamTable::new(),
            events: VecDeque::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Aggregation state of a live stream; `None` once it is gone.
    pub fn state(&self, stream_id: u32) -> Option<AggregationState> {
        self.table.get(stream_id).map(|s| s.state)
    }

    pub fn is_live(&self, stream_id: u32) -> bool {
        self.table.contains(stream_id)
    }

    pub fn live_streams(&self) -> usize {
        self.table.len()
    }

    pub fn poll_event(&mut self) -> Option<AggregateEvent> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> Vec<AggregateEvent> {
        self.events.drain(..).collect()
    }

    /// A leading header block arrived.
    ///
    /// `informational` marks a 1xx interim response; on the initiator side
    /// it is passed through as its own message and the stream keeps waiting
    /// for the final response. Responders ignore the flag.
    pub fn on_headers(
        &mut self,
        stream_id: u32,
        block: HeaderBlock,
        end_stream: bool,
        informational: bool,
    ) -> Result<(), StreamError> {
        trace!(stream_id, end_stream, informational, "headers");
        let result = if informational && self.role.inbound_direction() == Direction::Response {
            self.accept_informational(stream_id, block, end_stream)
        } else {
            self.accept_headers(stream_id, block, end_stream)
        };
        self.settle(stream_id, result)
    }

    /// A body chunk arrived.
    pub fn on_data(&mut self, stream_id: u32, data: &[u8], end_stream: bool) -> Result<(), StreamError> {
        trace!(stream_id, len = data.len(), end_stream, "data");
        let result = self.accept_data(stream_id, data, end_stream);
        self.settle(stream_id, result)
    }

    /// A trailing header block arrived. It must end the stream.
    pub fn on_trailers(
        &mut self,
        stream_id: u32,
        trailers: Vec<H2Header>,
        end_stream: bool,
    ) -> Result<(), StreamError> {
        trace!(stream_id, count = trailers.len(), end_stream, "trailers");
        let result = self.accept_trailers(stream_id, trailers, end_stream);
        self.settle(stream_id, result)
    }

    /// The stream was reset. Idempotent: unknown or finished streams are
    /// left alone and nothing is queued.
    pub fn on_reset(&mut self, stream_id: u32, error_code: u32) {
        trace!(stream_id, error_code, "reset");
        self.abort(stream_id, Cancellation::Reset { error_code });
    }

    /// Connection teardown: every live stream is cancelled, lowest id first.
    pub fn shutdown(&mut self) {
        for mut stream in self.table.drain() {
            stream.state = AggregationState::Aborted;
            debug!(stream_id = stream.id, "stream cancelled by connection close");
            self.events.push_back(AggregateEvent::Cancelled {
                stream_id: stream.id,
                reason: Cancellation::ConnectionClosed,
            });
        }
    }

    fn accept_headers(&mut self, stream_id: u32, block: HeaderBlock, end_stream: bool) -> Result<(), StreamError> {
        check_stream_id(stream_id)?;
        match self.state(stream_id) {
            Some(AggregationState::AwaitingHeaders) => {}
            Some(_) => return Err(StreamError::DuplicateStream { stream_id }),
            None => {
                self.table.create(stream_id, self.role)?;
            }
        }

        let (start_line, headers) = headers::to_aggregate(block, self.role.inbound_direction())
            .map_err(|e| StreamError::header(stream_id, e))?;

        let stream = self.live(stream_id)?;
        stream.start_line = Some(start_line);
        stream.headers = headers;
        stream.state = AggregationState::HeadersReceived;
        if end_stream {
            stream.end_stream = true;
            self.finish(stream_id);
        }
        Ok(())
    }

    fn accept_informational(
        &mut self,
        stream_id: u32,
        block: HeaderBlock,
        end_stream: bool,
    ) -> Result<(), StreamError> {
        check_stream_id(stream_id)?;
        match self.state(stream_id) {
            Some(AggregationState::AwaitingHeaders) => {}
            Some(_) => {
                return Err(StreamError::StreamSequence {
                    stream_id,
                    reason: "interim response after final headers",
                })
            }
            None => {
                self.table.create(stream_id, self.role)?;
            }
        }
        if end_stream {
            return Err(StreamError::StreamSequence {
                stream_id,
                reason: "interim response ends the stream",
            });
        }

        let (start_line, headers) = headers::to_aggregate(block, Direction::Response)
            .map_err(|e| StreamError::header(stream_id, e))?;
        let status = match start_line {
            StartLine::Response { status } => status,
            _ => {
                return Err(StreamError::StreamSequence {
                    stream_id,
                    reason: "interim response without a status",
                })
            }
        };

        let mut message = AggregateMessage::informational(status);
        message.headers = headers;
        debug!(stream_id, status, "informational response");
        self.events.push_back(AggregateEvent::Message { stream_id, message });
        Ok(())
    }

    fn accept_data(&mut self, stream_id: u32, data: &[u8], end_stream: bool) -> Result<(), StreamError> {
        let limit = self.max_body;
        let stream = self.table.get_mut(stream_id).ok_or(StreamError::StreamSequence {
            stream_id,
            reason: "data on a stream without headers",
        })?;
        if !stream.state.accepts_body() {
            return Err(StreamError::StreamSequence {
                stream_id,
                reason: "data before headers",
            });
        }
        if stream.body.len().saturating_add(data.len()) > limit {
            return Err(StreamError::MessageTooLarge { stream_id, limit });
        }

        stream.body.extend_from_slice(data);
        stream.state = AggregationState::BodyReceived;
        if end_stream {
            stream.end_stream = true;
            self.finish(stream_id);
        }
        Ok(())
    }

    fn accept_trailers(
        &mut self,
        stream_id: u32,
        trailers: Vec<H2Header>,
        end_stream: bool,
    ) -> Result<(), StreamError> {
        let stream = self.table.get_mut(stream_id).ok_or(StreamError::StreamSequence {
            stream_id,
            reason: "trailers on a stream without headers",
        })?;
        if !stream.state.accepts_body() {
            return Err(StreamError::StreamSequence {
                stream_id,
                reason: "trailers before headers",
            });
        }
        if !end_stream {
            return Err(StreamError::StreamSequence {
                stream_id,
                reason: "trailers without end-of-stream",
            });
        }
        headers::validate_trailers(&trailers).map_err(|e| StreamError::header(stream_id, e))?;

        stream.trailers.extend(trailers);
        stream.state = AggregationState::TrailersReceived;
        stream.end_stream = true;
        self.finish(stream_id);
        Ok(())
    }

    fn live(&mut self, stream_id: u32) -> Result<&mut LogicalStream, StreamError> {
        self.table.get_mut(stream_id).ok_or(StreamError::StreamSequence {
            stream_id,
            reason: "stream is not live",
        })
    }

    /// Hand the finished message off and forget the stream.
    fn finish(&mut self, stream_id: u32) {
        let Some(mut stream) = self.table.remove(stream_id) else {
            return;
        };
        let Some(start_line) = stream.start_line.take() else {
            return;
        };
        stream.state = AggregationState::Complete;

        let message = AggregateMessage {
            start_line,
            headers: std::mem::take(&mut stream.headers),
            body: stream.body.split().freeze(),
            trailers: std::mem::take(&mut stream.trailers),
        };
        debug!(
            stream_id,
            state = ?stream.state,
            body_len = message.body.len(),
            trailers = message.trailers.len(),
            "message aggregated"
        );
        self.events.push_back(AggregateEvent::Message { stream_id, message });
    }

    /// Discard live state for `stream_id` and queue a cancellation. Returns
    /// false if there was nothing to discard.
    fn abort(&mut self, stream_id: u32, reason: Cancellation) -> bool {
        let Some(mut stream) = self.table.remove(stream_id) else {
            return false;
        };
        stream.state = AggregationState::Aborted;
        debug!(stream_id, state = ?stream.state, ?reason, "stream cancelled");
        self.events
            .push_back(AggregateEvent::Cancelled { stream_id, reason });
        true
    }

    fn settle(&mut self, stream_id: u32, result: Result<(), StreamError>) -> Result<(), StreamError> {
        if let Err(err) = &result {
            warn!(stream_id, error = %err, "stream failed");
            self.abort(stream_id, Cancellation::Failed(err.clone()));
        }
        result
    }
}

fn check_stream_id(stream_id: u32) -> Result<(), StreamError> {
    if stream_id == 0 {
        return Err(StreamError::StreamSequence {
            stream_id,
            reason: "stream 0 carries no messages",
        });
    }
    Ok(())
}
