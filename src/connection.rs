//! Sans-I/O connection driver.
//!
//! `BridgeConnection` owns one connection's frame reader, aggregation table
//! and write buffer. Bytes from the transport go in through
//! [`recv`](BridgeConnection::recv); finished messages come out of
//! [`poll_event`](BridgeConnection::poll_event). Outgoing messages are
//! translated and serialized straight into the write buffer, so every
//! message's frames sit contiguously and in order; the caller ships
//! [`take_pending_send`](BridgeConnection::take_pending_send) to the
//! transport.
//!
//! ```text
//!   transport bytes
//!        |
//!   +----v--------+      +--------------------+
//!   | H2Codec     | ---> | InboundAggregator  | ---> AggregateEvent
//!   +-------------+      +--------------------+
//!
//!   AggregateMessage ---> OutboundTranslator ---> FrameWriter ---> pending bytes
//! ```

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::aggregator::{AggregateEvent, InboundAggregator};
use crate::config::BridgeConfig;
use crate::error::{CodecError, StreamError};
use crate::h2_codec::{FrameWriter, H2Codec, H2Event, CONNECTION_PREFACE};
use crate::headers::HeaderBlock;
use crate::message::{AggregateMessage, Role};
use crate::translator::OutboundTranslator;

/// Largest stream id HTTP/2 allows (31 bits).
const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

#[derive(Debug)]
pub struct BridgeConnection {
    config: BridgeConfig,
    codec: H2Codec,
    writer: FrameWriter,
    aggregator: InboundAggregator,
    translator: OutboundTranslator,
    pending_send: BytesMut,
    next_stream_id: u32,
}

impl BridgeConnection {
    /// The initiator queues the connection preface; both sides queue an
    /// empty SETTINGS frame.
    pub fn new(config: BridgeConfig) -> Self {
        let mut pending_send = BytesMut::new();
        if config.role == Role::Initiator {
            pending_send.extend_from_slice(CONNECTION_PREFACE);
        }
        pending_send.extend_from_slice(&H2Codec::create_settings());

        let next_stream_id = match config.role {
            Role::Initiator => 1,
            Role::Responder => 2,
        };

        Self {
            codec: H2Codec::new(),
            writer: FrameWriter::new(config.max_frame_size),
            aggregator: InboundAggregator::new(&config),
            translator: OutboundTranslator::from_config(&config),
            pending_send,
            next_stream_id,
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &InboundAggregator {
        &self.aggregator
    }

    /// Send `message` on the next locally initiated stream and return its id.
    /// The id is only consumed if the message translates.
    ///
    /// Initiator only: a responder has no way to open a stream without
    /// server push, which this crate does not do.
    pub fn send_message(&mut self, message: &AggregateMessage) -> Result<u32, StreamError> {
        let stream_id = self.next_stream_id;
        if self.config.role != Role::Initiator {
            return Err(StreamError::StreamSequence {
                stream_id,
                reason: "only the initiator opens streams",
            });
        }
        if stream_id > MAX_STREAM_ID {
            return Err(StreamError::StreamSequence {
                stream_id,
                reason: "stream ids exhausted",
            });
        }
        self.send_on_stream(stream_id, message)?;
        self.next_stream_id = stream_id + 2;
        Ok(stream_id)
    }

    /// Send `message` on an existing stream, e.g. a response to a request.
    pub fn send_on_stream(&mut self, stream_id: u32, message: &AggregateMessage) -> Result<(), StreamError> {
        let writes = self
            .translator
            .translate(message, stream_id, &self.config.scheme)?;
        for write in &writes {
            self.writer.write(write, &mut self.pending_send);
        }
        // An initiator picking its own id still opens that stream.
        if self.config.role == Role::Initiator && stream_id % 2 == 1 && stream_id >= self.next_stream_id {
            self.next_stream_id = stream_id.saturating_add(2);
        }
        debug!(stream_id, frames = writes.len(), "message queued");
        Ok(())
    }

    /// Abandon a stream from our side: aggregation state is dropped and a
    /// RST_STREAM is queued.
    pub fn reset_stream(&mut self, stream_id: u32, error_code: u32) {
        self.aggregator.on_reset(stream_id, error_code);
        self.pending_send
            .extend_from_slice(&H2Codec::create_rst_stream(stream_id, error_code));
    }

    /// Feed bytes read from the transport.
    ///
    /// Stream failures are handled here (the stream is reset, the rest of the
    /// connection carries on) and only show up as `Cancelled` events. An
    /// `Err` means the byte stream itself is broken.
    pub fn recv(&mut self, data: &[u8]) -> Result<(), CodecError> {
        for event in self.codec.process(data)? {
            if let Err(err) = self.dispatch(event) {
                warn!(error = %err, "resetting stream");
                // RST_STREAM on stream 0 is itself a protocol error.
                if err.stream_id() == 0 {
                    continue;
                }
                self.pending_send.extend_from_slice(&H2Codec::create_rst_stream(
                    err.stream_id(),
                    err.error_code(),
                ));
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, event: H2Event) -> Result<(), StreamError> {
        match event {
            H2Event::Headers {
                stream_id,
                fields,
                end_stream,
                ..
            } => {
                // A second block after the leading headers is the trailer block.
                let has_headers = self
                    .aggregator
                    .state(stream_id)
                    .is_some_and(|state| state.accepts_body());
                if has_headers {
                    return self.aggregator.on_trailers(stream_id, fields, end_stream);
                }
                if self.config.role == Role::Initiator && !self.aggregator.is_live(stream_id) {
                    self.check_response_stream(stream_id)?;
                }
                let block = HeaderBlock::from_fields(fields);
                let informational = self.config.role == Role::Initiator && block.is_informational();
                self.aggregator
                    .on_headers(stream_id, block, end_stream, informational)
            }
            H2Event::Data {
                stream_id,
                data,
                end_stream,
                ..
            } => self.aggregator.on_data(stream_id, &data, end_stream),
            H2Event::StreamReset {
                stream_id,
                error_code,
            } => {
                self.aggregator.on_reset(stream_id, error_code);
                Ok(())
            }
            H2Event::GoAway {
                last_stream_id,
                error_code,
            } => {
                debug!(last_stream_id, error_code, "peer is going away");
                Ok(())
            }
        }
    }

    /// Responses only arrive on odd ids we have already used.
    fn check_response_stream(&self, stream_id: u32) -> Result<(), StreamError> {
        if stream_id % 2 == 0 || stream_id >= self.next_stream_id {
            return Err(StreamError::StreamSequence {
                stream_id,
                reason: "response on a stream we never opened",
            });
        }
        Ok(())
    }

    pub fn poll_event(&mut self) -> Option<AggregateEvent> {
        self.aggregator.poll_event()
    }

    /// Bytes waiting to go out, in wire order.
    pub fn take_pending_send(&mut self) -> Bytes {
        trace!(len = self.pending_send.len(), "draining write buffer");
        self.pending_send.split().freeze()
    }

    pub fn has_pending_send(&self) -> bool {
        !self.pending_send.is_empty()
    }

    /// Tear the connection down. Every stream still aggregating is cancelled.
    pub fn close(&mut self) {
        debug!(live = self.aggregator.live_streams(), "connection closing");
        self.aggregator.shutdown();
    }
}
