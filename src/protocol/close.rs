//! Close status codes and close-frame payload layout (RFC 6455 Section 7.4).

/// WebSocket close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001): endpoint is shutting down or navigating away.
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Unsupported data (1003).
    UnsupportedData,
    /// Invalid payload (1007): e.g. non-UTF-8 in a text message.
    InvalidPayload,
    /// Policy violation (1008).
    PolicyViolation,
    /// Message too big (1009).
    MessageTooBig,
    /// Mandatory extension (1010).
    MandatoryExtension,
    /// Internal error (1011).
    InternalError,
    /// Any other registered or application code.
    Other(u16),
}

impl CloseCode {
    /// Create a `CloseCode` from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    /// Numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => *code,
        }
    }

    /// Whether this code may be sent in a close frame per RFC 6455 7.4.1.
    ///
    /// Codes 1004-1006 and 1015 are reserved and must never appear on the
    /// wire.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self.as_u16(), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

/// Build a close-frame payload: 2-byte big-endian code followed by a
/// UTF-8 reason.
#[must_use]
pub fn format_close_payload(code: CloseCode, reason: &str) -> Vec<u8> {
    let mut payload = code.as_u16().to_be_bytes().to_vec();
    payload.extend_from_slice(reason.as_bytes());
    payload
}

/// Extract the status code from a close-frame payload.
///
/// An empty payload carries no code; a 1-byte payload is malformed but the
/// close handshake still completes, so it also yields `None`.
#[must_use]
pub fn parse_close_code(payload: &[u8]) -> Option<CloseCode> {
    if payload.len() >= 2 {
        Some(CloseCode::from_u16(u16::from_be_bytes([
            payload[0], payload[1],
        ])))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for code in [1000u16, 1001, 1002, 1003, 1007, 1008, 1009, 1010, 1011, 4000] {
            assert_eq!(CloseCode::from_u16(code).as_u16(), code);
        }
    }

    #[test]
    fn test_reserved_codes_invalid() {
        for code in [1004u16, 1005, 1006, 1015, 2999] {
            assert!(!CloseCode::from_u16(code).is_valid(), "code {code}");
        }
        assert!(CloseCode::Normal.is_valid());
        assert!(CloseCode::Other(3000).is_valid());
    }

    #[test]
    fn test_format_and_parse() {
        let payload = format_close_payload(CloseCode::Normal, "bye");
        assert_eq!(&payload[..2], &[0x03, 0xe8]);
        assert_eq!(&payload[2..], b"bye");
        assert_eq!(parse_close_code(&payload), Some(CloseCode::Normal));
    }

    #[test]
    fn test_parse_short_payloads() {
        assert_eq!(parse_close_code(&[]), None);
        assert_eq!(parse_close_code(&[0x03]), None);
    }
}
