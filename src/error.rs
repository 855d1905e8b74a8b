//! Error types for the framing layer.
//!
//! Every failure mode of the frame codec and the connection state machine is
//! a variant here. Protocol violations are fatal to the read or write in
//! progress; `ReadLimitExceeded` is fatal to the current message only.

use thiserror::Error;

use crate::protocol::CloseCode;

/// Result type alias for framing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while framing or deframing messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Protocol violation detected in the incoming frame sequence.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Reserved opcode used (0x3-0x7, 0xB-0xF).
    #[error("reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Opcode value outside the 4-bit opcode space.
    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Reserved bits set without a negotiated extension.
    #[error("reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Control frame with FIN=0 (RFC 6455 forbids fragmented control frames).
    #[error("control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload larger than 125 bytes.
    #[error("control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Continuation frame received with no message in progress.
    #[error("continuation frame with nothing to continue")]
    UnexpectedContinuation,

    /// Server received an unmasked frame from a client.
    #[error("client frame must be masked")]
    UnmaskedClientFrame,

    /// Client received a masked frame from a server.
    #[error("server frame must not be masked")]
    MaskedServerFrame,

    /// The current message exceeded the configured read limit.
    #[error("read limit exceeded: message larger than {limit} bytes")]
    ReadLimitExceeded {
        /// The configured limit in bytes.
        limit: usize,
    },

    /// The close handshake has completed (or the peer vanished); no further
    /// messages can be read or written.
    #[error("connection closed: {0:?}")]
    ConnectionClosed(Option<CloseCode>),

    /// Not enough buffered bytes to decode a frame header.
    ///
    /// Internal signal for the read-buffer fill loop; callers of the public
    /// API never observe it.
    #[error("incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// A deadline passed to `write_control` expired.
    #[error("operation timed out")]
    Timeout,

    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
