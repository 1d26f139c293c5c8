//! Minimal HTTP/2 frame reader and writer (RFC 7540).
//!
//! The aggregation engine works on decoded frame events and produces frame
//! write requests; this module is the thin layer that turns those into bytes
//! and back so the engine can be driven over a real connection. Only what
//! stream aggregation needs is handled: HEADERS (with CONTINUATION assembly
//! and HPACK), DATA, RST_STREAM and GOAWAY. SETTINGS, PING, WINDOW_UPDATE,
//! PRIORITY, PUSH_PROMISE and unknown frame types are skipped; flow control
//! and settings negotiation belong to the connection owner.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;
use crate::hpack::{H2Header, HpackDecoder, HpackEncoder};
use crate::translator::FrameWrite;

/// HTTP/2 frame types (RFC 7540 Section 6)
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// HTTP/2 frame flags
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// HTTP/2 error codes (RFC 7540 Section 7)
pub mod error_code {
    pub const NO_ERROR: u32 = 0x0;
    pub const PROTOCOL_ERROR: u32 = 0x1;
    pub const CANCEL: u32 = 0x8;
}

/// Maximum accumulated header block size (256 KB).
/// Bounds memory held across a CONTINUATION sequence.
pub const MAX_HEADER_BLOCK_SIZE: usize = 256 * 1024;

/// The HTTP/2 connection preface (24 bytes)
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

const FRAME_HEADER_LEN: usize = 9;

/// A parsed HTTP/2 frame header (9 bytes)
#[derive(Debug, Clone)]
pub struct H2FrameHeader {
    pub length: u32, // 24 bits
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32, // 31 bits (high bit reserved)
}

impl H2FrameHeader {
    /// Parse a 9-byte frame header
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return None;
        }

        let length = ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | (data[2] as u32);
        let stream_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & 0x7FFF_FFFF;

        Some(Self {
            length,
            frame_type: data[3],
            flags: data[4],
            stream_id,
        })
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_LEN + self.length as usize
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags & flags::END_STREAM != 0
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags & flags::END_HEADERS != 0
    }

    pub fn is_padded(&self) -> bool {
        self.flags & flags::PADDED != 0
    }

    pub fn has_priority(&self) -> bool {
        self.flags & flags::PRIORITY != 0
    }
}

/// Priority fields carried on a HEADERS frame. Parsed and surfaced, never
/// acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub dependency: u32,
    /// Effective weight, 1..=256.
    pub weight: u16,
    pub exclusive: bool,
}

/// Stream-level events decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum H2Event {
    /// A complete, HPACK-decoded header block (HEADERS + CONTINUATION).
    Headers {
        stream_id: u32,
        fields: Vec<H2Header>,
        priority: Option<Priority>,
        padding: u8,
        end_stream: bool,
    },
    Data {
        stream_id: u32,
        data: Bytes,
        padding: u8,
        end_stream: bool,
    },
    StreamReset {
        stream_id: u32,
        error_code: u32,
    },
    GoAway {
        last_stream_id: u32,
        error_code: u32,
    },
}

/// Incremental frame reader. Feed it bytes in any split; it hands back
/// events for every frame completed so far.
#[derive(Debug, Default)]
pub struct H2Codec {
    /// Buffer for incomplete frames
    buffer: Vec<u8>,
    /// Preface check done (seen, or ruled out)
    preface_checked: bool,
    preface_received: bool,
    hpack: HpackDecoder,
    /// Stream ID with pending header block (waiting for CONTINUATION + END_HEADERS)
    pending_headers_stream: Option<u32>,
    pending_headers_end_stream: bool,
    pending_priority: Option<Priority>,
    pending_padding: u8,
    /// Accumulated header block data across HEADERS + CONTINUATION frames
    pending_header_block: Vec<u8>,
}

impl H2Codec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preface_received(&self) -> bool {
        self.preface_received
    }

    /// Process incoming data and return parsed events.
    pub fn process(&mut self, data: &[u8]) -> Result<Vec<H2Event>, CodecError> {
        self.buffer.extend_from_slice(data);
        let mut events = Vec::new();

        // Client connections open with the preface; servers start straight
        // with SETTINGS.
        if !self.preface_checked {
            let n = self.buffer.len().min(CONNECTION_PREFACE.len());
            if self.buffer[..n] != CONNECTION_PREFACE[..n] {
                self.preface_checked = true;
            } else if n == CONNECTION_PREFACE.len() {
                self.buffer.drain(..n);
                self.preface_checked = true;
                self.preface_received = true;
            } else {
                return Ok(events);
            }
        }

        loop {
            let header = match H2FrameHeader::parse(&self.buffer) {
                Some(h) => h,
                None => break,
            };
            let total_size = header.total_size();
            if self.buffer.len() < total_size {
                break;
            }

            // Split buffer to avoid double copy: payload keeps the frame,
            // self.buffer keeps whatever follows it.
            let remainder = self.buffer.split_off(total_size);
            let mut payload = std::mem::replace(&mut self.buffer, remainder);
            payload.drain(..FRAME_HEADER_LEN);

            if let Some(event) = self.parse_frame(&header, payload)? {
                events.push(event);
            }
        }

        Ok(events)
    }

    fn parse_frame(&mut self, header: &H2FrameHeader, payload: Vec<u8>) -> Result<Option<H2Event>, CodecError> {
        // An open header block admits nothing but its own CONTINUATION frames.
        if let Some(pending) = self.pending_headers_stream {
            if header.frame_type != frame_type::CONTINUATION {
                self.clear_pending();
                return Err(CodecError::ExpectedContinuation {
                    pending,
                    frame_type: header.frame_type,
                });
            }
        }
        if header.stream_id == 0 {
            if let Some(name) = stream_frame_name(header.frame_type) {
                return Err(CodecError::ZeroStreamId(name));
            }
        }

        match header.frame_type {
            frame_type::DATA => {
                let (data, padding) = extract_data_payload(header, payload)?;
                Ok(Some(H2Event::Data {
                    stream_id: header.stream_id,
                    data: Bytes::from(data),
                    padding,
                    end_stream: header.is_end_stream(),
                }))
            }
            frame_type::HEADERS => {
                let (block, padding, priority) = extract_headers_payload(header, payload)?;
                if header.is_end_headers() {
                    let fields = self.hpack.decode(&block)?;
                    return Ok(Some(H2Event::Headers {
                        stream_id: header.stream_id,
                        fields,
                        priority,
                        padding,
                        end_stream: header.is_end_stream(),
                    }));
                }
                if block.len() > MAX_HEADER_BLOCK_SIZE {
                    return Err(CodecError::HeaderBlockTooLarge {
                        size: block.len(),
                        max: MAX_HEADER_BLOCK_SIZE,
                    });
                }
                self.pending_headers_stream = Some(header.stream_id);
                self.pending_headers_end_stream = header.is_end_stream();
                self.pending_priority = priority;
                self.pending_padding = padding;
                self.pending_header_block = block;
                Ok(None)
            }
            frame_type::CONTINUATION => {
                let pending = self
                    .pending_headers_stream
                    .ok_or(CodecError::UnexpectedContinuation(header.stream_id))?;
                if pending != header.stream_id {
                    return Err(CodecError::ContinuationMismatch {
                        stream_id: header.stream_id,
                        pending,
                    });
                }
                let new_size = self.pending_header_block.len() + payload.len();
                if new_size > MAX_HEADER_BLOCK_SIZE {
                    self.clear_pending();
                    return Err(CodecError::HeaderBlockTooLarge {
                        size: new_size,
                        max: MAX_HEADER_BLOCK_SIZE,
                    });
                }
                self.pending_header_block.extend_from_slice(&payload);
                if !header.is_end_headers() {
                    return Ok(None);
                }

                let block = std::mem::take(&mut self.pending_header_block);
                let end_stream = self.pending_headers_end_stream;
                let priority = self.pending_priority;
                let padding = self.pending_padding;
                self.clear_pending();
                let fields = self.hpack.decode(&block)?;
                Ok(Some(H2Event::Headers {
                    stream_id: header.stream_id,
                    fields,
                    priority,
                    padding,
                    end_stream,
                }))
            }
            frame_type::RST_STREAM => {
                if payload.len() < 4 {
                    return Err(CodecError::FrameTooShort("RST_STREAM"));
                }
                let error_code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                Ok(Some(H2Event::StreamReset {
                    stream_id: header.stream_id,
                    error_code,
                }))
            }
            frame_type::GOAWAY => {
                if payload.len() < 8 {
                    return Err(CodecError::FrameTooShort("GOAWAY"));
                }
                let last_stream_id =
                    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
                let error_code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
                Ok(Some(H2Event::GoAway {
                    last_stream_id,
                    error_code,
                }))
            }
            // Connection management is not ours.
            _ => Ok(None),
        }
    }

    fn clear_pending(&mut self) {
        self.pending_headers_stream = None;
        self.pending_headers_end_stream = false;
        self.pending_priority = None;
        self.pending_padding = 0;
        self.pending_header_block.clear();
    }

    /// Create a RST_STREAM frame
    pub fn create_rst_stream(stream_id: u32, error_code: u32) -> Vec<u8> {
        let mut frame = Vec::with_capacity(13);
        put_frame_header(&mut frame, 4, frame_type::RST_STREAM, 0, stream_id);
        frame.extend_from_slice(&error_code.to_be_bytes());
        frame
    }

    /// Create an empty SETTINGS frame (use default settings)
    pub fn create_settings() -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN);
        put_frame_header(&mut frame, 0, frame_type::SETTINGS, 0, 0);
        frame
    }

    /// Create a CONTINUATION frame to continue a header block
    /// end_headers: true if this is the final frame in the header block sequence
    pub fn create_continuation_frame(stream_id: u32, payload: &[u8], end_headers: bool) -> Vec<u8> {
        let flags_byte = if end_headers { flags::END_HEADERS } else { 0 };
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        put_frame_header(&mut frame, payload.len(), frame_type::CONTINUATION, flags_byte, stream_id);
        frame.extend_from_slice(payload);
        frame
    }
}

/// Frame types that only exist on a stream.
fn stream_frame_name(frame_type: u8) -> Option<&'static str> {
    match frame_type {
        frame_type::DATA => Some("DATA"),
        frame_type::HEADERS => Some("HEADERS"),
        frame_type::RST_STREAM => Some("RST_STREAM"),
        frame_type::CONTINUATION => Some("CONTINUATION"),
        _ => None,
    }
}

/// Strip DATA padding. Returns the data and the pad length.
fn extract_data_payload(header: &H2FrameHeader, mut payload: Vec<u8>) -> Result<(Vec<u8>, u8), CodecError> {
    if !header.is_padded() {
        return Ok((payload, 0));
    }
    let Some(&pad_length) = payload.first() else {
        return Err(CodecError::FrameTooShort("DATA"));
    };
    if pad_length as usize >= payload.len() {
        return Err(CodecError::InvalidPadding("DATA"));
    }
    payload.truncate(payload.len() - pad_length as usize);
    payload.remove(0);
    Ok((payload, pad_length))
}

/// Strip HEADERS padding and priority fields. Returns the header block
/// fragment, pad length and priority.
fn extract_headers_payload(
    header: &H2FrameHeader,
    mut payload: Vec<u8>,
) -> Result<(Vec<u8>, u8, Option<Priority>), CodecError> {
    let mut offset = 0;
    let mut padding = 0u8;

    if header.is_padded() {
        let Some(&pad_length) = payload.first() else {
            return Err(CodecError::FrameTooShort("HEADERS"));
        };
        padding = pad_length;
        offset = 1;
    }

    let mut priority = None;
    if header.has_priority() {
        if payload.len() < offset + 5 {
            return Err(CodecError::FrameTooShort("HEADERS"));
        }
        let raw = u32::from_be_bytes([
            payload[offset],
            payload[offset + 1],
            payload[offset + 2],
            payload[offset + 3],
        ]);
        priority = Some(Priority {
            dependency: raw & 0x7FFF_FFFF,
            weight: payload[offset + 4] as u16 + 1,
            exclusive: raw & 0x8000_0000 != 0,
        });
        offset += 5;
    }

    if offset + padding as usize > payload.len() {
        return Err(CodecError::InvalidPadding("HEADERS"));
    }
    payload.truncate(payload.len() - padding as usize);
    payload.drain(..offset);
    Ok((payload, padding, priority))
}

fn put_frame_header(out: &mut impl BufMut, length: usize, frame_type: u8, flags: u8, stream_id: u32) {
    out.put_uint(length as u64, 3);
    out.put_u8(frame_type);
    out.put_u8(flags);
    out.put_u32(stream_id & 0x7FFF_FFFF);
}

/// Serializes [`FrameWrite`]s. Holds the connection's HPACK encoder, so
/// writes must go through it in wire order.
#[derive(Debug)]
pub struct FrameWriter {
    hpack: HpackEncoder,
    max_frame_size: usize,
}

impl FrameWriter {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            hpack: HpackEncoder::new(),
            max_frame_size: max_frame_size.max(1),
        }
    }

    pub fn write(&mut self, write: &FrameWrite, out: &mut BytesMut) {
        match write {
            FrameWrite::Headers {
                stream_id,
                fields,
                end_stream,
            } => self.write_headers(*stream_id, fields, *end_stream, out),
            FrameWrite::Data {
                stream_id,
                data,
                end_stream,
            } => self.write_data(*stream_id, data, *end_stream, out),
        }
    }

    /// HEADERS, followed by CONTINUATION frames if the encoded block does
    /// not fit in one frame.
    fn write_headers(&mut self, stream_id: u32, fields: &[H2Header], end_stream: bool, out: &mut BytesMut) {
        let block = self.hpack.encode(fields);
        let first = block.len().min(self.max_frame_size);

        let mut flags_byte = if end_stream { flags::END_STREAM } else { 0 };
        if first == block.len() {
            flags_byte |= flags::END_HEADERS;
        }
        put_frame_header(out, first, frame_type::HEADERS, flags_byte, stream_id);
        out.extend_from_slice(&block[..first]);

        let mut rest = &block[first..];
        while !rest.is_empty() {
            let n = rest.len().min(self.max_frame_size);
            out.extend_from_slice(&H2Codec::create_continuation_frame(stream_id, &rest[..n], n == rest.len()));
            rest = &rest[n..];
        }
    }

    fn write_data(&mut self, stream_id: u32, data: &Bytes, end_stream: bool, out: &mut BytesMut) {
        if data.is_empty() {
            let flags_byte = if end_stream { flags::END_STREAM } else { 0 };
            put_frame_header(out, 0, frame_type::DATA, flags_byte, stream_id);
            return;
        }
        for (i, chunk) in data.chunks(self.max_frame_size).enumerate() {
            let last = (i + 1) * self.max_frame_size >= data.len();
            let flags_byte = if end_stream && last { flags::END_STREAM } else { 0 };
            put_frame_header(out, chunk.len(), frame_type::DATA, flags_byte, stream_id);
            out.extend_from_slice(chunk);
        }
    }
}
