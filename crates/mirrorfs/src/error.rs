//! Error types for the mirror protocol.

use std::io;

/// Protocol-level failure.
///
/// Everything here is fatal to the call that produced it; transport,
/// handshake and protocol violations are fatal to the whole session.
/// Expected filesystem outcomes ("not found", "access denied", ...) are
/// not errors; they travel as [`crate::message::Status`] values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket closed or truncated mid-frame.
    #[error("connection error: {0}")]
    Connection(String),

    /// Key agreement failed or the peer did not open with a handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Malformed bytes on decode, or a payload that failed to decrypt.
    #[error("codec error: {0}")]
    Codec(String),

    /// A value that cannot be represented on the wire.
    #[error("unsupported value: {0}")]
    UnsupportedType(String),

    /// The peer sent a header that makes no sense at this point.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The remote handler failed. No detail crosses the wire beyond the
    /// error tag itself.
    #[error("remote method raised an error")]
    RemoteExecution,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// True for failures that end the session, as opposed to a single call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Handshake(_) | Error::ProtocolViolation(_)
        )
    }
}
