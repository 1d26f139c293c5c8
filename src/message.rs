//! The aggregate (HTTP/1-style) message model.

use bytes::Bytes;

use crate::hpack::{find_header, H2Header};

/// Which side of the connection we are. Decides how inbound header blocks
/// are read: a responder receives requests, an initiator receives responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    Initiator,
    #[default]
    Responder,
}

impl Role {
    /// Direction of the messages this role receives.
    pub fn inbound_direction(self) -> Direction {
        match self {
            Role::Initiator => Direction::Response,
            Role::Responder => Direction::Request,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

/// Start-line of an aggregate message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request {
        method: String,
        path: String,
        /// Request-target authority; fallback for `:authority` when there is
        /// no `Host` header.
        authority: Option<String>,
        /// Overrides the connection scheme when set.
        scheme: Option<String>,
    },
    Response {
        status: u16,
    },
    /// A 1xx interim response. Never ends a stream.
    Informational {
        status: u16,
    },
}

/// A complete request or response: start-line, ordered header list, body and
/// trailers. Header lists are plain vectors so that order and duplicate names
/// survive untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateMessage {
    pub start_line: StartLine,
    pub headers: Vec<H2Header>,
    pub body: Bytes,
    pub trailers: Vec<H2Header>,
}

impl AggregateMessage {
    pub fn new(start_line: StartLine) -> Self {
        Self {
            start_line,
            headers: Vec::new(),
            body: Bytes::new(),
            trailers: Vec::new(),
        }
    }

    pub fn request(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(StartLine::Request {
            method: method.into(),
            path: path.into(),
            authority: None,
            scheme: None,
        })
    }

    pub fn response(status: u16) -> Self {
        Self::new(StartLine::Response { status })
    }

    pub fn informational(status: u16) -> Self {
        Self::new(StartLine::Informational { status })
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(H2Header::new(name, value));
        self
    }

    pub fn with_trailer(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailers.push(H2Header::new(name, value));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the request-target authority. No-op on responses.
    pub fn with_authority(mut self, value: impl Into<String>) -> Self {
        if let StartLine::Request { authority, .. } = &mut self.start_line {
            *authority = Some(value.into());
        }
        self
    }

    /// Sets the request scheme. No-op on responses.
    pub fn with_scheme(mut self, value: impl Into<String>) -> Self {
        if let StartLine::Request { scheme, .. } = &mut self.start_line {
            *scheme = Some(value.into());
        }
        self
    }

    pub fn direction(&self) -> Direction {
        match self.start_line {
            StartLine::Request { .. } => Direction::Request,
            StartLine::Response { .. } | StartLine::Informational { .. } => Direction::Response,
        }
    }

    pub fn is_informational(&self) -> bool {
        matches!(self.start_line, StartLine::Informational { .. })
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn method(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            _ => None,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self.start_line {
            StartLine::Response { status } | StartLine::Informational { status } => Some(status),
            StartLine::Request { .. } => None,
        }
    }
}
