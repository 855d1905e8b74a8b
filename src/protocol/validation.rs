//! Incoming frame-header validation (RFC 6455 Sections 5.1, 5.2, 5.5).
//!
//! Masking rules depend on the connection role: servers must reject unmasked
//! client frames, clients must reject masked server frames. RSV bits are
//! always rejected here since no extensions are negotiated in this core.

use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::frame::{FrameHeader, MAX_CONTROL_FRAME_PAYLOAD};

/// Validator for incoming frame headers.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    role: Role,
    accept_unmasked_frames: bool,
}

impl FrameValidator {
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            role,
            accept_unmasked_frames: false,
        }
    }

    /// Accept unmasked frames from clients (non-compliant, testing only).
    #[must_use]
    pub fn with_accept_unmasked(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }

    /// Validate a decoded header before any payload is consumed.
    ///
    /// # Errors
    ///
    /// - `Error::UnmaskedClientFrame` / `Error::MaskedServerFrame` on
    ///   masking-direction violations
    /// - `Error::ReservedBitsSet` if any RSV bit is set
    /// - `Error::FragmentedControlFrame` on a control frame with FIN=0
    /// - `Error::ControlFrameTooLarge` on a control payload over 125 bytes
    pub fn validate(&self, header: &FrameHeader) -> Result<()> {
        match self.role {
            Role::Server => {
                if header.mask.is_none() && !self.accept_unmasked_frames {
                    return Err(Error::UnmaskedClientFrame);
                }
            }
            Role::Client => {
                if header.mask.is_some() {
                    return Err(Error::MaskedServerFrame);
                }
            }
        }

        if header.rsv1 || header.rsv2 || header.rsv3 {
            return Err(Error::ReservedBitsSet);
        }

        if header.opcode.is_control() {
            if !header.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if header.payload_len > MAX_CONTROL_FRAME_PAYLOAD as u64 {
                return Err(Error::ControlFrameTooLarge(header.payload_len as usize));
            }
        }

        Ok(())
    }
}
