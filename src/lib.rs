//! h2-bridge: HTTP/2 stream aggregation for HTTP/1-style message handlers
//!
//! This crate sits between a multiplexed HTTP/2 connection and code that
//! thinks in whole messages: one request or response object with a
//! start-line, an ordered header list and a body. Frame events for many
//! interleaved streams go in; complete messages come out, one per stream.
//! In the other direction a message and a stream id become the ordered frame
//! writes that carry it.
//!
//! # Features
//!
//! - **Sans-I/O Design**: no runtime, no sockets, no locking; one
//!   connection is driven from one execution context
//! - **Per-stream state machines**: headers, body, trailers and reset handled
//!   independently for every stream; a bad stream never disturbs another
//! - **Header mapping**: pseudo-headers to start-line and `Host`, and back,
//!   with order and duplicates of regular headers preserved
//! - **Interim responses**: 1xx responses pass through without finishing the
//!   stream
//! - **Body limit**: oversized bodies fail only their own stream
//! - **Wire adapter**: a minimal frame reader/writer with HPACK (via
//!   fluke-hpack) for driving the engine over real bytes
//!
//! # Quick Start
//!
//! ```rust
//! use h2_bridge::{AggregateEvent, BridgeConfig, H2Header, HeaderBlock, InboundAggregator};
//!
//! let mut aggregator = InboundAggregator::new(&BridgeConfig::responder());
//!
//! let block = HeaderBlock::new(
//!     vec![
//!         H2Header::new(":method", "POST"),
//!         H2Header::new(":path", "/example"),
//!         H2Header::new(":authority", "www.example.org:5555"),
//!         H2Header::new(":scheme", "http"),
//!     ],
//!     vec![H2Header::new("foo", "goo")],
//! );
//! aggregator.on_headers(3, block, false, false).unwrap();
//! aggregator.on_data(3, b"foooooogoooo", true).unwrap();
//!
//! match aggregator.poll_event() {
//!     Some(AggregateEvent::Message { stream_id, message }) => {
//!         assert_eq!(stream_id, 3);
//!         assert_eq!(message.header("host"), Some("www.example.org:5555"));
//!         assert_eq!(&message.body[..], b"foooooogoooo");
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```
//!
//! # Architecture
//!
//! - [`headers`]: stateless pseudo-header mapping
//! - [`table`]: per-connection stream arena
//! - [`aggregator`]: inbound state machines
//! - [`translator`]: outbound frame write sequences
//! - [`h2_codec`] and [`connection`]: bytes in, bytes out
//!
//! It does NOT provide:
//! - Flow control, priority scheduling or settings negotiation
//! - TCP/TLS transport (you provide the bytes)
//! - Timeouts (reset the stream from your session layer instead)

pub mod aggregator;
pub mod config;
pub mod connection;
pub mod error;
pub mod h2_codec;
pub mod headers;
pub mod hpack;
pub mod message;
pub mod table;
pub mod translator;

pub use aggregator::{AggregateEvent, Cancellation, InboundAggregator};
pub use config::{BridgeConfig, DEFAULT_MAX_AGGREGATE_BODY_SIZE, DEFAULT_MAX_FRAME_SIZE};
pub use connection::BridgeConnection;
pub use error::{CodecError, HeaderError, StreamError};
pub use h2_codec::{
    error_code, flags, frame_type, FrameWriter, H2Codec, H2Event, H2FrameHeader, Priority,
    CONNECTION_PREFACE, MAX_HEADER_BLOCK_SIZE,
};
pub use headers::{authority_from_host, from_aggregate, normalize, to_aggregate, HeaderBlock};
pub use hpack::{H2Header, HpackDecoder, HpackEncoder};
pub use message::{AggregateMessage, Direction, Role, StartLine};
pub use table::{AggregationState, LogicalStream, StreamTable};
pub use translator::{FrameWrite, OutboundTranslator};
