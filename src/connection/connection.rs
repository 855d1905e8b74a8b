use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace};

use crate::config::Config;
use crate::connection::{ConnectionState, MessageReader, MessageWriter, Role};
use crate::error::{Error, Result};
use crate::protocol::frame::{FrameHeader, MAX_CONTROL_FRAME_PAYLOAD, MAX_HEADER_SIZE};
use crate::protocol::validation::FrameValidator;
use crate::protocol::{
    CloseCode, OpCode, apply_mask_fast, apply_mask_offset, format_close_payload, parse_close_code,
};

/// Callback invoked with the payload of a received ping or pong.
pub type ControlHandler = Box<dyn FnMut(&[u8]) + Send>;

/// Outcome of consuming one frame header (and, for control frames, its
/// payload) from the stream.
pub(crate) enum Advance {
    /// A Text or Binary frame started a new logical message. Its payload is
    /// primed in the connection read state.
    Message(OpCode),
    /// A continuation frame of the in-progress message was primed.
    Fragment,
    /// A pong with no handler installed; surfaced from `next_reader`.
    Pong(Vec<u8>),
    /// A control frame fully serviced in-loop: a ping answered or routed to
    /// its handler, or a pong consumed by its handler.
    Handled,
}

/// Generate a random seed for mask generation.
/// Falls back to system time if getrandom fails.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x12345678)
    }
}

/// A WebSocket framing connection over a raw duplex byte stream.
///
/// `Connection` sits directly above the transport (the HTTP upgrade
/// handshake has already happened elsewhere) and turns the stream into a
/// sequence of logical messages: [`next_writer`](Self::next_writer) streams
/// an outgoing message frame by frame, [`next_reader`](Self::next_reader)
/// reassembles an incoming one and services interleaved control frames.
///
/// The reader and writer handles mutably borrow the connection, so only one
/// logical operation per direction can be in flight at a time. The two
/// directions share that one borrow: a task parked in
/// [`next_reader`](Self::next_reader) cannot send pings or messages until
/// the call returns. Drive traffic from a single task that alternates
/// reads and writes, or put the connection behind your own splitting layer
/// when both directions must proceed concurrently.
///
/// ## Example
///
/// ```rust,ignore
/// use wsframe::{Config, Connection, OpCode, Role};
///
/// let mut conn = Connection::new(stream, Role::Client, Config::default());
/// conn.write_message(OpCode::Text, b"hello").await?;
/// let (opcode, mut reader) = conn.next_reader().await?;
/// let payload = reader.read_to_end().await?;
/// ```
pub struct Connection<T> {
    io: T,
    read_buf: BytesMut,
    role: Role,
    config: Config,
    validator: FrameValidator,
    mask_counter: u32,
    state: ConnectionState,

    // Read state carried across calls: the frame currently being consumed
    // and the running total for the in-progress logical message.
    pub(crate) read_final: bool,
    pub(crate) read_remaining: u64,
    read_mask: Option<[u8; 4]>,
    read_mask_pos: usize,
    read_length: u64,
    pub(crate) read_limit: usize,
    pub(crate) read_limit_hit: bool,

    // Payload of a surfaced control frame, drained by a control reader.
    pub(crate) control_buf: Vec<u8>,
    pub(crate) control_pos: usize,

    ping_handler: Option<ControlHandler>,
    pong_handler: Option<ControlHandler>,
}

impl<T> Connection<T> {
    /// Create a connection over an already-upgraded stream.
    pub fn new(io: T, role: Role, config: Config) -> Self {
        let validator =
            FrameValidator::new(role).with_accept_unmasked(config.accept_unmasked_frames);
        let read_limit = config.read_limit;
        Self {
            io,
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            role,
            config,
            validator,
            mask_counter: random_mask_seed(),
            state: ConnectionState::Open,
            read_final: true,
            read_remaining: 0,
            read_mask: None,
            read_mask_pos: 0,
            read_length: 0,
            read_limit,
            read_limit_hit: false,
            control_buf: Vec::new(),
            control_pos: 0,
            ping_handler: None,
            pong_handler: None,
        }
    }

    /// The endpoint role this side plays.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current close-handshake state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Set the per-message read limit in bytes (0 = unlimited).
    ///
    /// Counted against payload bytes delivered to the message read stream;
    /// control frames are exempt.
    pub fn set_read_limit(&mut self, limit: usize) {
        self.read_limit = limit;
    }

    /// Install a ping handler.
    ///
    /// With a handler installed, received pings are passed to it instead of
    /// being answered with an automatic pong.
    pub fn set_ping_handler(&mut self, handler: ControlHandler) {
        self.ping_handler = Some(handler);
    }

    /// Install a pong handler.
    ///
    /// With a handler installed, received pongs are consumed by it instead
    /// of being surfaced from [`next_reader`](Self::next_reader).
    pub fn set_pong_handler(&mut self, handler: ControlHandler) {
        self.pong_handler = Some(handler);
    }

    /// Consume the connection, returning the underlying stream.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }

    fn generate_mask(&mut self) -> [u8; 4] {
        self.mask_counter = self.mask_counter.wrapping_add(0x9E37_79B9);
        let mut x = self.mask_counter;
        x ^= x >> 16;
        x = x.wrapping_mul(0x7FEB_352D);
        x ^= x >> 15;
        x = x.wrapping_mul(0x846C_A68B);
        x ^= x >> 16;
        x.to_le_bytes()
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Wait for the next logical message.
    ///
    /// Drives the frame-consumption loop: any unread remainder of the
    /// previous message is skipped, pings are answered, and a reader scoped
    /// to the new message is returned together with its opcode. Pongs with
    /// no handler installed are surfaced as their own single-payload
    /// message.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` once the close handshake has run (a
    ///   received close frame is echoed first if this side had not sent one)
    /// - protocol violations in the incoming frame sequence
    /// - I/O errors from the underlying stream
    ///
    /// The read limit never fails this call: an oversized message still
    /// hands out its reader, and the reader fails once delivered bytes
    /// cross the limit.
    pub async fn next_reader(&mut self) -> Result<(OpCode, MessageReader<'_, T>)> {
        if !self.state.can_receive() {
            return Err(Error::ConnectionClosed(None));
        }
        loop {
            match self.advance_frame().await? {
                Advance::Message(opcode) => {
                    return Ok((opcode, MessageReader::data(self, opcode)));
                }
                Advance::Pong(payload) => {
                    self.control_buf = payload;
                    self.control_pos = 0;
                    return Ok((OpCode::Pong, MessageReader::control(self, OpCode::Pong)));
                }
                Advance::Fragment | Advance::Handled => {}
            }
        }
    }

    /// Consume the next frame header, servicing control frames.
    ///
    /// Any unread payload of the current frame is discarded first, which is
    /// what lets `next_reader` abandon a half-read message.
    pub(crate) async fn advance_frame(&mut self) -> Result<Advance> {
        if self.read_remaining > 0 {
            self.discard_payload().await?;
        }

        let header = self.read_header().await?;
        trace!(opcode = %header.opcode, fin = header.fin, len = header.payload_len, "frame header");
        self.validator.validate(&header)?;

        if header.opcode.is_control() {
            let payload = self.read_control_payload(&header).await?;
            return match header.opcode {
                OpCode::Close => self.handle_close(payload).await,
                OpCode::Ping => {
                    if let Some(handler) = &mut self.ping_handler {
                        handler(&payload);
                    } else {
                        debug!(len = payload.len(), "answering ping with pong");
                        self.send_control_frame(OpCode::Pong, &payload).await?;
                    }
                    Ok(Advance::Handled)
                }
                OpCode::Pong => {
                    if let Some(handler) = &mut self.pong_handler {
                        handler(&payload);
                        Ok(Advance::Handled)
                    } else {
                        Ok(Advance::Pong(payload))
                    }
                }
                _ => unreachable!("is_control covers Close, Ping, Pong"),
            };
        }

        match header.opcode {
            OpCode::Continuation => {
                if self.read_final {
                    return Err(Error::UnexpectedContinuation);
                }
            }
            OpCode::Text | OpCode::Binary => {
                if !self.read_final {
                    return Err(Error::ProtocolViolation(
                        "data frame before final fragment of previous message".into(),
                    ));
                }
            }
            _ => {}
        }

        self.read_final = header.fin;
        self.read_remaining = header.payload_len;
        self.read_mask = header.mask;
        self.read_mask_pos = 0;

        if header.opcode == OpCode::Continuation {
            Ok(Advance::Fragment)
        } else {
            // New logical message: the delivery counter starts over. The
            // limit is enforced as bytes reach the caller, never here, so
            // an oversized message still hands out a reader.
            self.read_length = 0;
            self.read_limit_hit = false;
            Ok(Advance::Message(header.opcode))
        }
    }

    async fn read_header(&mut self) -> Result<FrameHeader> {
        loop {
            match FrameHeader::decode(&self.read_buf) {
                Ok((header, consumed)) => {
                    self.read_buf.advance(consumed);
                    return Ok(header);
                }
                Err(Error::IncompleteFrame { .. }) => self.fill_read_buf().await?,
                Err(e) => return Err(e),
            }
        }
    }

    async fn fill_read_buf(&mut self) -> Result<()> {
        self.read_buf.reserve(self.config.read_buffer_size);
        let n = self.io.read_buf(&mut self.read_buf).await?;
        if n == 0 {
            self.state = ConnectionState::Closed;
            return Err(Error::ConnectionClosed(None));
        }
        Ok(())
    }

    /// Deliver up to `buf.len()` payload bytes of the current frame,
    /// unmasked. The caller guarantees `read_remaining > 0`.
    ///
    /// Delivered bytes count toward the read limit; the call whose total
    /// crosses the limit fails instead of returning payload.
    pub(crate) async fn read_payload_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.read_buf.is_empty() {
            self.fill_read_buf().await?;
        }
        let n = (self.read_remaining.min(buf.len() as u64) as usize).min(self.read_buf.len());
        buf[..n].copy_from_slice(&self.read_buf[..n]);
        self.read_buf.advance(n);
        if let Some(key) = self.read_mask {
            apply_mask_offset(&mut buf[..n], key, self.read_mask_pos);
            self.read_mask_pos = (self.read_mask_pos + n) % 4;
        }
        self.read_remaining -= n as u64;

        self.read_length = self.read_length.saturating_add(n as u64);
        if self.read_limit > 0 && self.read_length > self.read_limit as u64 {
            self.read_limit_hit = true;
            debug!(limit = self.read_limit, "read limit exceeded");
            return Err(Error::ReadLimitExceeded {
                limit: self.read_limit,
            });
        }
        Ok(n)
    }

    async fn discard_payload(&mut self) -> Result<()> {
        while self.read_remaining > 0 {
            if self.read_buf.is_empty() {
                self.fill_read_buf().await?;
            }
            let n = (self.read_remaining.min(self.read_buf.len() as u64)) as usize;
            self.read_buf.advance(n);
            self.read_remaining -= n as u64;
        }
        self.read_mask = None;
        self.read_mask_pos = 0;
        Ok(())
    }

    async fn read_control_payload(&mut self, header: &FrameHeader) -> Result<Vec<u8>> {
        // Length is validated against MAX_CONTROL_FRAME_PAYLOAD already.
        let len = header.payload_len as usize;
        while self.read_buf.len() < len {
            self.fill_read_buf().await?;
        }
        let mut payload = self.read_buf[..len].to_vec();
        self.read_buf.advance(len);
        if let Some(key) = header.mask {
            apply_mask_fast(&mut payload, key);
        }
        Ok(payload)
    }

    /// Run the receiving side of the close handshake.
    ///
    /// Echoes a close frame iff this side has not sent one yet, then marks
    /// the connection closed. Always reports `ConnectionClosed` upward.
    async fn handle_close(&mut self, payload: Vec<u8>) -> Result<Advance> {
        let code = parse_close_code(&payload);
        debug!(?code, "close frame received");
        if self.state == ConnectionState::Open {
            // Best effort: the peer may already be gone.
            let _ = self.send_control_frame(OpCode::Close, &payload).await;
        }
        self.state = ConnectionState::Closed;
        Err(Error::ConnectionClosed(code))
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Start a streaming data message.
    ///
    /// The returned writer borrows the connection's write side exclusively;
    /// it must be finalized with [`MessageWriter::close`] to emit the
    /// FIN frame.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` if `opcode` is not Text or Binary
    /// - `Error::ConnectionClosed` once a close frame has been sent
    pub fn next_writer(&mut self, opcode: OpCode) -> Result<MessageWriter<'_, T>> {
        if !matches!(opcode, OpCode::Text | OpCode::Binary) {
            return Err(Error::ProtocolViolation(format!(
                "{opcode} cannot start a data message"
            )));
        }
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(None));
        }
        Ok(MessageWriter::new(self, opcode))
    }

    /// Send a complete, already-buffered message.
    ///
    /// Equivalent to `next_writer` + one `write` + `close` for data
    /// opcodes; control opcodes are sent as a single control frame.
    pub async fn write_message(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        if opcode.is_control() {
            return self.write_control(opcode, payload, None).await;
        }
        let mut writer = self.next_writer(opcode)?;
        writer.write(payload).await?;
        writer.close().await
    }

    /// Send a single control frame, bypassing any data message in progress.
    ///
    /// Valid between the fragments of a data message per RFC 6455. The
    /// optional absolute deadline bounds the underlying write; expiry
    /// surfaces as `Error::Timeout`.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` if `opcode` is not a control opcode
    /// - `Error::ControlFrameTooLarge` for payloads over 125 bytes
    /// - `Error::ConnectionClosed` after the close handshake has completed
    pub async fn write_control(
        &mut self,
        opcode: OpCode,
        payload: &[u8],
        deadline: Option<Instant>,
    ) -> Result<()> {
        if !opcode.is_control() {
            return Err(Error::ProtocolViolation(format!(
                "{opcode} is not a control opcode"
            )));
        }
        if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlFrameTooLarge(payload.len()));
        }
        if self.state == ConnectionState::Closed {
            return Err(Error::ConnectionClosed(None));
        }

        match deadline {
            Some(at) => timeout_at(at, self.send_control_frame(opcode, payload))
                .await
                .map_err(|_| Error::Timeout)??,
            None => self.send_control_frame(opcode, payload).await?,
        }

        if opcode == OpCode::Close && self.state == ConnectionState::Open {
            self.state = ConnectionState::Closing;
        }
        Ok(())
    }

    /// Initiate the close handshake with a status code and reason.
    ///
    /// The peer's close frame is observed through a later
    /// `next_reader` call, which then reports `ConnectionClosed`.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if !code.is_valid() {
            return Err(Error::ProtocolViolation(format!(
                "close code {} must not be sent",
                code.as_u16()
            )));
        }
        let payload = format_close_payload(code, reason);
        self.write_control(OpCode::Close, &payload, None).await
    }

    async fn send_control_frame(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        let mut payload = payload.to_vec();
        self.write_frame(true, opcode, &mut payload).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Encode and send one frame. Masks `payload` in place when this side
    /// is the client.
    pub(crate) async fn write_frame(
        &mut self,
        fin: bool,
        opcode: OpCode,
        payload: &mut [u8],
    ) -> Result<()> {
        let mask = if self.role.must_mask() {
            Some(self.generate_mask())
        } else {
            None
        };

        let header = FrameHeader::new(fin, opcode, mask, payload.len() as u64);
        let mut head = [0u8; MAX_HEADER_SIZE];
        let head_len = header.encode_into(&mut head)?;

        if let Some(key) = mask {
            apply_mask_fast(payload, key);
        }

        self.io.write_all(&head[..head_len]).await?;
        self.io.write_all(payload).await?;
        Ok(())
    }

    pub(crate) async fn flush_io(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    pub(crate) fn can_send(&self) -> bool {
        self.state.can_send()
    }
}
