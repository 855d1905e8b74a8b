//! WebSocket wire-protocol leaf modules (RFC 6455).

pub mod close;
pub mod frame;
pub mod mask;
pub mod opcode;
pub mod validation;

pub use close::{CloseCode, format_close_payload, parse_close_code};
pub use frame::{FrameHeader, MAX_CONTROL_FRAME_PAYLOAD, MAX_HEADER_SIZE};
pub use mask::{apply_mask, apply_mask_fast, apply_mask_offset};
pub use opcode::OpCode;
pub use validation::FrameValidator;
