//! WebSocket message framing over any async byte stream (RFC 6455,
//! sections 5 and 7).
//!
//! `wsframe` starts where the HTTP upgrade handshake ends: given a stream
//! that already speaks WebSocket, it provides the data-transfer layer.
//! Messages stream in and out frame by frame, so neither side ever has to
//! buffer a whole message:
//!
//! - [`Connection::next_writer`] hands out a [`MessageWriter`] that
//!   fragments large payloads at the write-buffer boundary and masks
//!   client frames.
//! - [`Connection::next_reader`] hands out a [`MessageReader`] that
//!   reassembles fragments, unmasks payloads, enforces the read limit, and
//!   services interleaved pings, pongs, and the close handshake.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wsframe::{CloseCode, Config, Connection, OpCode, Role};
//!
//! let mut conn = Connection::new(stream, Role::Client, Config::default());
//!
//! conn.write_message(OpCode::Text, b"hello").await?;
//!
//! let (opcode, mut reader) = conn.next_reader().await?;
//! let payload = reader.read_to_end().await?;
//!
//! conn.close(CloseCode::Normal, "bye").await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;

pub use config::Config;
pub use connection::{Connection, ConnectionState, ControlHandler, MessageReader, MessageWriter, Role};
pub use error::{Error, Result};
pub use protocol::{CloseCode, FrameHeader, OpCode};
