//! Bridge configuration.

use crate::message::Role;

/// Default cap on an aggregated body (8 MiB).
pub const DEFAULT_MAX_AGGREGATE_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Default outbound DATA frame size: the HTTP/2 initial SETTINGS_MAX_FRAME_SIZE.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16_384;

/// Per-connection settings for the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Our side of the connection (default: responder).
    ///
    /// A responder reads inbound header blocks as requests, an initiator as
    /// responses.
    pub role: Role,

    /// Largest body a single stream may aggregate (default: 8 MiB).
    ///
    /// A body of exactly this many bytes is accepted; one more byte fails
    /// the stream with `MessageTooLarge` and resets it.
    pub max_aggregate_body_size: usize,

    /// Largest payload per outbound frame (default: 16 KiB). Comes from the
    /// peer's SETTINGS_MAX_FRAME_SIZE.
    pub max_frame_size: usize,

    /// Scheme of the underlying connection, sent as `:scheme` unless a
    /// request names its own (default: "https").
    pub scheme: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            role: Role::Responder,
            max_aggregate_body_size: DEFAULT_MAX_AGGREGATE_BODY_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            scheme: "https".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn initiator() -> Self {
        Self::default().with_role(Role::Initiator)
    }

    pub fn responder() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_max_aggregate_body_size(mut self, bytes: usize) -> Self {
        self.max_aggregate_body_size = bytes;
        self
    }

    pub fn with_max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }
}
