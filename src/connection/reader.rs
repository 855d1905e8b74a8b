use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Connection;
use crate::connection::connection::Advance;
use crate::error::{Error, Result};
use crate::protocol::OpCode;

#[derive(Debug)]
enum ReaderKind {
    /// A Text or Binary message, possibly spread over many frames.
    Data,
    /// The buffered payload of a surfaced control frame (a pong).
    Control,
}

/// Streaming reader for one incoming message.
///
/// Obtained from [`Connection::next_reader`]. Yields the reassembled
/// payload across fragment boundaries; control frames interleaved with the
/// fragments are serviced transparently. `read` returning `Ok(0)` marks the
/// end of the message.
///
/// Dropping the reader abandons the rest of the message; the connection
/// skips any unread remainder when the next message is requested.
pub struct MessageReader<'a, T> {
    conn: &'a mut Connection<T>,
    opcode: OpCode,
    kind: ReaderKind,
}

impl<T> std::fmt::Debug for MessageReader<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageReader")
            .field("opcode", &self.opcode)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<'a, T> MessageReader<'a, T> {
    pub(crate) fn data(conn: &'a mut Connection<T>, opcode: OpCode) -> Self {
        Self {
            conn,
            opcode,
            kind: ReaderKind::Data,
        }
    }

    pub(crate) fn control(conn: &'a mut Connection<T>, opcode: OpCode) -> Self {
        Self {
            conn,
            opcode,
            kind: ReaderKind::Control,
        }
    }

    /// Opcode of the message this reader delivers.
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> MessageReader<'_, T> {
    /// Read the next chunk of message payload into `buf`.
    ///
    /// Returns `Ok(0)` once the final fragment has been fully delivered.
    ///
    /// # Errors
    ///
    /// `Error::ReadLimitExceeded` when the message crosses the configured
    /// read limit; the error repeats on every subsequent call for the same
    /// message. Protocol and I/O errors from advancing to the next fragment
    /// propagate as-is.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.kind {
            ReaderKind::Control => {
                let remaining = self.conn.control_buf.len() - self.conn.control_pos;
                let n = remaining.min(buf.len());
                buf[..n].copy_from_slice(
                    &self.conn.control_buf[self.conn.control_pos..self.conn.control_pos + n],
                );
                self.conn.control_pos += n;
                Ok(n)
            }
            ReaderKind::Data => loop {
                if self.conn.read_limit_hit {
                    return Err(Error::ReadLimitExceeded {
                        limit: self.conn.read_limit,
                    });
                }
                if self.conn.read_remaining > 0 {
                    return self.conn.read_payload_chunk(buf).await;
                }
                if self.conn.read_final {
                    return Ok(0);
                }
                if let Advance::Message(opcode) = self.conn.advance_frame().await? {
                    // advance_frame rejects new data frames mid-message, so
                    // only a surfaced control frame could land here.
                    return Err(Error::ProtocolViolation(format!(
                        "{opcode} frame inside fragmented message"
                    )));
                }
            },
        }
    }

    /// Drain the rest of the message into a `Vec`.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }
}
