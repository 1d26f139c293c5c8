//! Mapping between HTTP/2 pseudo-headers and the aggregate start-line.
//!
//! Inbound, a header block is validated (RFC 7540 Section 8.1.2.1: pseudo
//! headers first, no duplicates, no strangers) and turned into a
//! [`StartLine`] plus the regular header list, with a `Host` header
//! synthesized from `:authority` when the block has none. Outbound, the
//! start-line and `Host` header become pseudo-headers again.
//!
//! Everything here is stateless.

use bytes::Bytes;

use crate::error::HeaderError;
use crate::hpack::{find_header, H2Header};
use crate::message::{AggregateMessage, Direction, StartLine};

pub const METHOD: &str = ":method";
pub const PATH: &str = ":path";
pub const AUTHORITY: &str = ":authority";
pub const SCHEME: &str = ":scheme";
pub const STATUS: &str = ":status";

const HOST: &str = "Host";

/// Hop-by-hop headers that have no meaning in HTTP/2 (RFC 7540 Section 8.1.2.2).
const CONNECTION_SPECIFIC: [&str; 5] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// A header block split into its pseudo-header set and regular headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    pub pseudo: Vec<H2Header>,
    pub regular: Vec<H2Header>,
}

impl HeaderBlock {
    pub fn new(pseudo: Vec<H2Header>, regular: Vec<H2Header>) -> Self {
        Self { pseudo, regular }
    }

    /// Split a decoded field list at the first regular header. Anything after
    /// that point lands in `regular`, including misplaced pseudo-headers,
    /// which [`to_aggregate`] then rejects.
    pub fn from_fields(mut fields: Vec<H2Header>) -> Self {
        let split = fields
            .iter()
            .position(|h| !h.is_pseudo())
            .unwrap_or(fields.len());
        let regular = fields.split_off(split);
        Self {
            pseudo: fields,
            regular,
        }
    }

    /// Pseudo-headers first, then regular headers: the order they go on the wire.
    pub fn into_fields(self) -> Vec<H2Header> {
        let mut fields = self.pseudo;
        fields.extend(self.regular);
        fields
    }

    pub fn pseudo_value(&self, name: &str) -> Option<&str> {
        self.pseudo
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }

    /// True when `:status` is a 1xx interim code.
    pub fn is_informational(&self) -> bool {
        matches!(self.pseudo_value(STATUS), Some(s) if s.len() == 3 && s.starts_with('1'))
    }
}

/// Convert an inbound header block into a start-line and header list.
pub fn to_aggregate(
    block: HeaderBlock,
    direction: Direction,
) -> Result<(StartLine, Vec<H2Header>), HeaderError> {
    let mut pseudo = PseudoFields::default();
    let mut regular = Vec::with_capacity(block.regular.len() + 1);
    let mut saw_regular = false;

    for field in block.pseudo.into_iter().chain(block.regular) {
        if !field.is_pseudo() {
            saw_regular = true;
            regular.push(field);
            continue;
        }
        if saw_regular {
            return Err(HeaderError::PseudoHeaderOrder(field.name));
        }
        pseudo.set(field, direction)?;
    }

    match direction {
        Direction::Request => {
            let method = pseudo.method.ok_or(HeaderError::MissingPseudoHeader(METHOD))?;
            let (path, scheme) = if method.eq_ignore_ascii_case("CONNECT") {
                let authority = pseudo
                    .authority
                    .clone()
                    .ok_or(HeaderError::MissingPseudoHeader(AUTHORITY))?;
                (pseudo.path.unwrap_or(authority), pseudo.scheme)
            } else {
                let path = pseudo.path.ok_or(HeaderError::MissingPseudoHeader(PATH))?;
                let scheme = pseudo.scheme.ok_or(HeaderError::MissingPseudoHeader(SCHEME))?;
                (path, Some(scheme))
            };

            if let Some(authority) = &pseudo.authority {
                if find_header(&regular, HOST).is_none() {
                    regular.insert(0, H2Header::new(HOST, authority.clone()));
                }
            }

            Ok((
                StartLine::Request {
                    method,
                    path,
                    authority: pseudo.authority,
                    scheme,
                },
                regular,
            ))
        }
        Direction::Response => {
            let status = pseudo.status.ok_or(HeaderError::MissingPseudoHeader(STATUS))?;
            Ok((StartLine::Response { status: parse_status(&status)? }, regular))
        }
    }
}

/// Derive the outbound header block for `message`.
///
/// `:authority` comes from the `Host` header when there is one, otherwise
/// from the start-line authority. `:scheme` is the message's own scheme if it
/// carries one, otherwise `connection_scheme`.
pub fn from_aggregate(
    message: &AggregateMessage,
    connection_scheme: &str,
) -> Result<HeaderBlock, HeaderError> {
    let pseudo = match &message.start_line {
        StartLine::Request {
            method,
            path,
            authority,
            scheme,
        } => {
            if method.is_empty() {
                return Err(HeaderError::MissingStartLine("method"));
            }
            let authority = message
                .header(HOST)
                .map(authority_from_host)
                .or(authority.as_deref())
                .filter(|a| !a.is_empty());

            if method.eq_ignore_ascii_case("CONNECT") {
                let authority = authority.ok_or(HeaderError::MissingPseudoHeader(AUTHORITY))?;
                vec![
                    H2Header::new(METHOD, method.clone()),
                    H2Header::new(AUTHORITY, authority),
                ]
            } else {
                if path.is_empty() {
                    return Err(HeaderError::MissingStartLine("path"));
                }
                let mut pseudo = vec![
                    H2Header::new(METHOD, method.clone()),
                    H2Header::new(PATH, path.clone()),
                ];
                if let Some(authority) = authority {
                    pseudo.push(H2Header::new(AUTHORITY, authority));
                }
                let scheme = scheme.as_deref().unwrap_or(connection_scheme);
                pseudo.push(H2Header::new(SCHEME, scheme));
                pseudo
            }
        }
        StartLine::Response { status } | StartLine::Informational { status } => {
            if !(100..=999).contains(status) {
                return Err(HeaderError::InvalidStatus(status.to_string()));
            }
            vec![H2Header::new(STATUS, status.to_string())]
        }
    };

    let mut regular = Vec::with_capacity(message.headers.len());
    for header in &message.headers {
        if header.is_pseudo() {
            return Err(HeaderError::UnexpectedPseudoHeader(header.name.clone()));
        }
        if header.is_named(HOST) || is_connection_specific(header) {
            continue;
        }
        regular.push(header.clone());
    }

    Ok(HeaderBlock { pseudo, regular })
}

/// The form `message` takes after going out through [`from_aggregate`] and
/// coming back through [`to_aggregate`].
///
/// Inbound `Host` is rebuilt from `:authority`, so it leads the header list
/// and the start-line authority matches it; a request without a scheme gets
/// `connection_scheme`. Connection-specific headers are gone, as is `Host`
/// on responses. A CONNECT request has the authority as its path and no
/// scheme, and an interim response has no body or trailers. Order and
/// duplicates of everything else are untouched.
pub fn normalize(message: &AggregateMessage, connection_scheme: &str) -> AggregateMessage {
    let mut headers: Vec<H2Header> = message
        .headers
        .iter()
        .filter(|h| !h.is_named(HOST) && !is_connection_specific(h))
        .cloned()
        .collect();

    let start_line = match &message.start_line {
        StartLine::Request {
            method,
            path,
            authority,
            scheme,
        } => {
            let authority = message
                .header(HOST)
                .map(authority_from_host)
                .or(authority.as_deref())
                .filter(|a| !a.is_empty())
                .map(str::to_string);
            if let Some(authority) = &authority {
                headers.insert(0, H2Header::new(HOST, authority.clone()));
            }
            if method.eq_ignore_ascii_case("CONNECT") {
                StartLine::Request {
                    method: method.clone(),
                    path: authority.clone().unwrap_or_else(|| path.clone()),
                    authority,
                    scheme: None,
                }
            } else {
                StartLine::Request {
                    method: method.clone(),
                    path: path.clone(),
                    authority,
                    scheme: Some(scheme.clone().unwrap_or_else(|| connection_scheme.to_string())),
                }
            }
        }
        other => other.clone(),
    };

    // An interim response is a lone header block.
    if message.is_informational() {
        return AggregateMessage {
            start_line,
            headers,
            body: Bytes::new(),
            trailers: Vec::new(),
        };
    }
    AggregateMessage {
        start_line,
        headers,
        body: message.body.clone(),
        trailers: message.trailers.clone(),
    }
}

/// Trailers carry regular headers only.
pub fn validate_trailers(trailers: &[H2Header]) -> Result<(), HeaderError> {
    match trailers.iter().find(|h| h.is_pseudo()) {
        Some(h) => Err(HeaderError::UnexpectedPseudoHeader(h.name.clone())),
        None => Ok(()),
    }
}

/// Reduce a `Host` value to a bare authority.
///
/// Legacy clients sometimes put a whole URL in `Host`
/// (`http://user@www.example.org:5555/example`); scheme, userinfo and path
/// are dropped.
pub fn authority_from_host(host: &str) -> &str {
    let rest = match host.find("://") {
        Some(i) => &host[i + 3..],
        None => host,
    };
    let rest = rest.split(&['/', '?', '#'][..]).next().unwrap_or(rest);
    match rest.rfind('@') {
        Some(i) => &rest[i + 1..],
        None => rest,
    }
}

fn is_connection_specific(header: &H2Header) -> bool {
    CONNECTION_SPECIFIC.iter().any(|name| header.is_named(name))
}

fn parse_status(value: &str) -> Result<u16, HeaderError> {
    if value.len() != 3 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HeaderError::InvalidStatus(value.to_string()));
    }
    match value.parse::<u16>() {
        Ok(status) if status >= 100 => Ok(status),
        _ => Err(HeaderError::InvalidStatus(value.to_string())),
    }
}

#[derive(Default)]
struct PseudoFields {
    method: Option<String>,
    path: Option<String>,
    authority: Option<String>,
    scheme: Option<String>,
    status: Option<String>,
}

impl PseudoFields {
    fn set(&mut self, field: H2Header, direction: Direction) -> Result<(), HeaderError> {
        let slot = match (direction, field.name.as_str()) {
            (Direction::Request, METHOD) => Some(&mut self.method),
            (Direction::Request, PATH) => Some(&mut self.path),
            (Direction::Request, AUTHORITY) => Some(&mut self.authority),
            (Direction::Request, SCHEME) => Some(&mut self.scheme),
            (Direction::Response, STATUS) => Some(&mut self.status),
            _ => None,
        };
        let Some(slot) = slot else {
            return Err(HeaderError::UnexpectedPseudoHeader(field.name));
        };
        if slot.is_some() {
            return Err(HeaderError::DuplicatePseudoHeader(field.name));
        }
        *slot = Some(field.value);
        Ok(())
    }
}
