//! Frame-header codec (RFC 6455 Section 5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                 Masking key (if MASK set)                     |
//! +---------------------------------------------------------------+
//! ```
//!
//! Only the header is codec'd here; payload bytes are streamed by the
//! connection and masked separately (see [`crate::protocol::mask`]).

use crate::error::{Error, Result};
use crate::protocol::OpCode;

/// Maximum payload size for control frames (RFC 6455 Section 5.5).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Maximum encoded header size: 2 fixed bytes, 8 extended-length bytes,
/// 4 masking-key bytes.
pub const MAX_HEADER_SIZE: usize = 14;

/// A decoded WebSocket frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1. Zero unless an extension is negotiated.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key, present on frames sent by the client role.
    pub mask: Option<[u8; 4]>,
    /// Declared payload length in bytes.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Create a header with reserved bits clear.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, mask: Option<[u8; 4]>, payload_len: u64) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask,
            payload_len,
        }
    }

    /// Decode a header from the front of `buf`.
    ///
    /// Returns the header and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if `buf` does not yet hold a full header
    /// - `Error::ReservedOpcode` / `Error::InvalidOpcode` for bad opcodes
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }

        let byte0 = buf[0];
        let byte1 = buf[1];

        let fin = (byte0 & 0x80) != 0;
        let rsv1 = (byte0 & 0x40) != 0;
        let rsv2 = (byte0 & 0x20) != 0;
        let rsv3 = (byte0 & 0x10) != 0;
        let opcode = OpCode::from_u8(byte0 & 0x0F)?;

        let masked = (byte1 & 0x80) != 0;
        let len_field = byte1 & 0x7F;

        let (payload_len, len_size) = match len_field {
            0..=125 => (u64::from(len_field), 0),
            126 => {
                if buf.len() < 4 {
                    return Err(Error::IncompleteFrame {
                        needed: 4 - buf.len(),
                    });
                }
                (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 2)
            }
            127 => {
                if buf.len() < 10 {
                    return Err(Error::IncompleteFrame {
                        needed: 10 - buf.len(),
                    });
                }
                let mut len_bytes = [0u8; 8];
                len_bytes.copy_from_slice(&buf[2..10]);
                (u64::from_be_bytes(len_bytes), 8)
            }
            _ => unreachable!(),
        };

        let mask_offset = 2 + len_size;
        let header_size = if masked { mask_offset + 4 } else { mask_offset };
        if buf.len() < header_size {
            return Err(Error::IncompleteFrame {
                needed: header_size - buf.len(),
            });
        }

        let mask = if masked {
            let mut key = [0u8; 4];
            key.copy_from_slice(&buf[mask_offset..mask_offset + 4]);
            Some(key)
        } else {
            None
        };

        Ok((
            Self {
                fin,
                rsv1,
                rsv2,
                rsv3,
                opcode,
                mask,
                payload_len,
            },
            header_size,
        ))
    }

    /// Encode the header into `buf`, returning the number of bytes written.
    ///
    /// `buf` must be at least [`MAX_HEADER_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// `Error::ControlFrameTooLarge` if a control opcode declares a payload
    /// longer than 125 bytes. That is a caller contract violation caught at
    /// encode time.
    pub fn encode_into(&self, buf: &mut [u8; MAX_HEADER_SIZE]) -> Result<usize> {
        if self.opcode.is_control() && self.payload_len > MAX_CONTROL_FRAME_PAYLOAD as u64 {
            return Err(Error::ControlFrameTooLarge(self.payload_len as usize));
        }

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        if self.rsv1 {
            byte0 |= 0x40;
        }
        if self.rsv2 {
            byte0 |= 0x20;
        }
        if self.rsv3 {
            byte0 |= 0x10;
        }
        buf[0] = byte0;

        let mut offset = 2;
        let len_field = if self.payload_len <= 125 {
            self.payload_len as u8
        } else if self.payload_len <= u64::from(u16::MAX) {
            buf[2..4].copy_from_slice(&(self.payload_len as u16).to_be_bytes());
            offset += 2;
            126
        } else {
            buf[2..10].copy_from_slice(&self.payload_len.to_be_bytes());
            offset += 8;
            127
        };

        buf[1] = if self.mask.is_some() {
            len_field | 0x80
        } else {
            len_field
        };

        if let Some(key) = self.mask {
            buf[offset..offset + 4].copy_from_slice(&key);
            offset += 4;
        }

        Ok(offset)
    }
}
