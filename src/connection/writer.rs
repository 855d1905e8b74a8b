use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::OpCode;

/// Streaming writer for one outgoing message.
///
/// Obtained from [`Connection::next_writer`]. Payload accumulates in an
/// internal buffer; whenever the buffer fills, a non-final frame goes out
/// and the message continues with continuation frames. [`close`](Self::close)
/// sends the final frame (possibly empty) and flushes the transport.
///
/// The writer mutably borrows the connection, so no other message can be
/// started while it is alive. Dropping it without `close` leaves the
/// message unterminated on the wire; always close.
pub struct MessageWriter<'a, T> {
    conn: &'a mut Connection<T>,
    opcode: OpCode,
    buf: Vec<u8>,
    frame_sent: bool,
}

impl<'a, T> MessageWriter<'a, T> {
    pub(crate) fn new(conn: &'a mut Connection<T>, opcode: OpCode) -> Self {
        let cap = conn.config().write_buffer_size;
        Self {
            conn,
            opcode,
            buf: Vec::with_capacity(cap),
            frame_sent: false,
        }
    }

    /// Opcode this message was started with.
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> MessageWriter<'_, T> {
    /// Append payload to the message, emitting full buffers as non-final
    /// frames. Returns the number of bytes consumed, always `data.len()`.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let cap = self.conn.config().write_buffer_size;
        let mut rest = data;
        while !rest.is_empty() {
            let space = cap - self.buf.len();
            let take = space.min(rest.len());
            self.buf.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.buf.len() == cap {
                self.flush_frame(false).await?;
            }
        }
        Ok(data.len())
    }

    /// Send a control frame between the fragments of this message.
    ///
    /// RFC 6455 permits control frames at any frame boundary; the buffered
    /// payload stays buffered and the message continues afterwards.
    pub async fn write_control(
        &mut self,
        opcode: OpCode,
        payload: &[u8],
        deadline: Option<Instant>,
    ) -> Result<()> {
        self.conn.write_control(opcode, payload, deadline).await
    }

    /// Finalize the message: send the remaining payload as the final frame
    /// and flush the transport.
    ///
    /// The final frame is empty when a previous flush consumed the payload
    /// exactly. Consumes the writer; a new message needs a new
    /// [`Connection::next_writer`] call.
    pub async fn close(mut self) -> Result<()> {
        self.flush_frame(true).await?;
        self.conn.flush_io().await
    }

    async fn flush_frame(&mut self, fin: bool) -> Result<()> {
        if !self.conn.can_send() {
            return Err(Error::ConnectionClosed(None));
        }
        let opcode = if self.frame_sent {
            OpCode::Continuation
        } else {
            self.opcode
        };
        self.conn.write_frame(fin, opcode, &mut self.buf).await?;
        self.frame_sent = true;
        self.buf.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connection::Role;
    use tokio::io::{AsyncReadExt, duplex};

    async fn wire_bytes(stream: &mut tokio::io::DuplexStream) -> Vec<u8> {
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_single_frame_message() {
        let (a, mut b) = duplex(1 << 16);
        let mut server = Connection::new(a, Role::Server, Config::default());

        let mut writer = server.next_writer(OpCode::Text).unwrap();
        assert_eq!(writer.write(b"hello").await.unwrap(), 5);
        writer.close().await.unwrap();
        drop(server);

        let wire = wire_bytes(&mut b).await;
        assert_eq!(wire, [0x81, 0x05, b'h', b'e', b'l', b'l', b'o']);
    }

    #[tokio::test]
    async fn test_fragmentation_at_buffer_boundary() {
        let (a, mut b) = duplex(1 << 16);
        let config = Config::default().with_write_buffer_size(4);
        let mut server = Connection::new(a, Role::Server, config);

        let mut writer = server.next_writer(OpCode::Binary).unwrap();
        writer.write(&[1, 2, 3, 4, 5, 6]).await.unwrap();
        writer.close().await.unwrap();
        drop(server);

        let wire = wire_bytes(&mut b).await;
        // Binary(4 bytes, FIN=0) then Continuation(2 bytes, FIN=1).
        assert_eq!(
            wire,
            [0x02, 0x04, 1, 2, 3, 4, 0x80, 0x02, 5, 6]
        );
    }

    #[tokio::test]
    async fn test_exact_fill_emits_empty_final_frame() {
        let (a, mut b) = duplex(1 << 16);
        let config = Config::default().with_write_buffer_size(4);
        let mut server = Connection::new(a, Role::Server, config);

        let mut writer = server.next_writer(OpCode::Binary).unwrap();
        writer.write(&[1, 2, 3, 4]).await.unwrap();
        writer.close().await.unwrap();
        drop(server);

        let wire = wire_bytes(&mut b).await;
        assert_eq!(wire, [0x02, 0x04, 1, 2, 3, 4, 0x80, 0x00]);
    }

    #[tokio::test]
    async fn test_empty_message_is_one_final_frame() {
        let (a, mut b) = duplex(1 << 16);
        let mut server = Connection::new(a, Role::Server, Config::default());

        let writer = server.next_writer(OpCode::Text).unwrap();
        writer.close().await.unwrap();
        drop(server);

        let wire = wire_bytes(&mut b).await;
        assert_eq!(wire, [0x81, 0x00]);
    }

    #[tokio::test]
    async fn test_byte_at_a_time_writes_coalesce() {
        let (a, mut b) = duplex(1 << 16);
        let mut server = Connection::new(a, Role::Server, Config::default());

        let mut writer = server.next_writer(OpCode::Text).unwrap();
        for byte in b"hello" {
            writer.write(std::slice::from_ref(byte)).await.unwrap();
        }
        writer.close().await.unwrap();
        drop(server);

        // Default buffer is far larger than the payload, so the bytes end
        // up in one frame.
        let wire = wire_bytes(&mut b).await;
        assert_eq!(wire, [0x81, 0x05, b'h', b'e', b'l', b'l', b'o']);
    }

    #[tokio::test]
    async fn test_each_client_frame_has_fresh_mask() {
        let (a, mut b) = duplex(1 << 16);
        let config = Config::default().with_write_buffer_size(4);
        let mut client = Connection::new(a, Role::Client, config);

        let mut writer = client.next_writer(OpCode::Binary).unwrap();
        writer.write(&[0u8; 8]).await.unwrap();
        writer.close().await.unwrap();
        drop(client);

        let wire = wire_bytes(&mut b).await;
        // Two full frames of 4 zero bytes plus an empty final frame, each
        // masked: header(2) + key(4) + payload.
        assert_eq!(wire.len(), (2 + 4 + 4) * 2 + (2 + 4));
        let key1 = &wire[2..6];
        let key2 = &wire[12..16];
        assert_ne!(key1, key2, "per-frame mask keys should differ");
        // Zero payload XOR key equals the key itself.
        assert_eq!(&wire[6..10], key1);
    }
}
