//! Error types for the messaging layer.

use std::io;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while advertising, discovering, or exchanging
/// messages with a peer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from a socket operation.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The underlying transport reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] zmq::Error),

    /// A bounded wait expired before completion.
    #[error("socket timed out after {wait_for_s}s")]
    SocketTimedOut {
        /// How long the caller was willing to wait.
        wait_for_s: f64,
    },

    /// An address was malformed, or a sequence was given where a single
    /// address is required.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A control RPC verb that is not one of `advertise`, `unadvertise`, or
    /// `discover`.
    #[error("unimplemented verb: {0}")]
    UnimplementedVerb(String),

    /// The beacon could not bind its UDP or control socket, so it fell back
    /// to talking to a peer-owned beacon over loopback.
    #[error("beacon bind failed: {0}")]
    BindFailed(String),

    /// An incoming frame could not be decoded; the caller should drop it
    /// and move on rather than propagate this further.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
}

impl Error {
    /// True if this is a bounded-wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::SocketTimedOut { .. })
    }

    /// True if this is a malformed or disallowed address.
    pub fn is_invalid_address(&self) -> bool {
        matches!(self, Self::InvalidAddress(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_includes_duration() {
        let err = Error::SocketTimedOut { wait_for_s: 1.5 };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn invalid_address_is_recognized() {
        let err = Error::InvalidAddress("[]".into());
        assert!(err.is_invalid_address());
        assert!(!err.is_timeout());
    }
}
