//! End-to-end framing tests over an in-memory duplex stream.
//!
//! Exercises the message layer the way a peer would: many payload sizes
//! across the 7/16/64-bit length encodings, drip-fed reads that split
//! frame headers across buffer fills, byte-wise writes, interleaved
//! control frames, read limits, and the close handshake.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf, duplex};
use wsframe::{CloseCode, Config, Connection, Error, OpCode, Role};

/// Opt-in frame tracing: `RUST_LOG=wsframe=trace cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How a [`ChunkedStream`] truncates each read, mirroring the patterns a
/// slow or bursty peer produces.
#[derive(Clone, Copy)]
enum ReadPattern {
    /// Deliver whatever the inner stream has.
    AsIs,
    /// At most this many bytes per read.
    Fixed(usize),
    /// Half of the requested buffer, rounded up.
    Half,
}

/// Wraps a stream so reads are drip-fed per a [`ReadPattern`], forcing the
/// frame decoder through its partial-header paths. Writes pass through
/// untouched.
struct ChunkedStream<T> {
    inner: T,
    pattern: ReadPattern,
}

impl<T> ChunkedStream<T> {
    fn new(inner: T, pattern: ReadPattern) -> Self {
        Self { inner, pattern }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for ChunkedStream<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let limit = match this.pattern {
            ReadPattern::AsIs => buf.remaining(),
            ReadPattern::Fixed(n) => n.min(buf.remaining()),
            ReadPattern::Half => buf.remaining().div_ceil(2),
        };
        let mut small = buf.take(limit);
        match Pin::new(&mut this.inner).poll_read(cx, &mut small) {
            Poll::Ready(Ok(())) => {
                let n = small.filled().len();
                // take() hands out part of buf's own storage, so the first
                // n bytes are initialized by the inner read.
                unsafe { buf.assume_init(n) };
                buf.advance(n);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for ChunkedStream<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, data)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Payload sizes straddling every length-encoding boundary: 7-bit
/// (0..=125), 16-bit (126..=65535), and 64-bit (65536..).
const SIZES: &[usize] = &[
    0, 1, 2, 124, 125, 126, 127, 128, 129, 65534, 65535, 65536, 65537,
];

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u32).wrapping_mul(31) as u8).collect()
}

fn pipe() -> (DuplexStream, DuplexStream) {
    duplex(1 << 21)
}

async fn assert_delivery(
    sender_role: Role,
    read_pattern: ReadPattern,
    write_buffer_size: usize,
    sizes: &[usize],
) {
    init_tracing();
    let (a, b) = pipe();
    let config = Config::default().with_write_buffer_size(write_buffer_size);
    let mut sender = Connection::new(a, sender_role, config.clone());
    let receiver_role = match sender_role {
        Role::Client => Role::Server,
        Role::Server => Role::Client,
    };
    let mut receiver = Connection::new(ChunkedStream::new(b, read_pattern), receiver_role, config);

    for &size in sizes {
        let payload = pattern(size);
        sender.write_message(OpCode::Binary, &payload).await.unwrap();

        let (opcode, mut reader) = receiver.next_reader().await.unwrap();
        assert_eq!(opcode, OpCode::Binary, "size {size}");
        let got = reader.read_to_end().await.unwrap();
        assert_eq!(got, payload, "size {size}");
    }
}

#[tokio::test]
async fn test_framing_matrix_client_to_server() {
    assert_delivery(Role::Client, ReadPattern::AsIs, 1 << 20, SIZES).await;
}

#[tokio::test]
async fn test_framing_matrix_server_to_client() {
    assert_delivery(Role::Server, ReadPattern::AsIs, 1 << 20, SIZES).await;
}

#[tokio::test]
async fn test_framing_matrix_one_byte_reads() {
    // Single-byte reads split every header and masking key across fills.
    let sizes = &[0, 1, 125, 126, 127, 129];
    assert_delivery(Role::Client, ReadPattern::Fixed(1), 1 << 20, sizes).await;
    assert_delivery(Role::Server, ReadPattern::Fixed(1), 1 << 20, sizes).await;
}

#[tokio::test]
async fn test_framing_matrix_half_reads() {
    assert_delivery(Role::Client, ReadPattern::Half, 1 << 20, SIZES).await;
    assert_delivery(Role::Server, ReadPattern::Half, 1 << 20, SIZES).await;
}

#[tokio::test]
async fn test_framing_matrix_odd_chunk_reads() {
    assert_delivery(Role::Client, ReadPattern::Fixed(139), 1 << 20, SIZES).await;
}

#[tokio::test]
async fn test_framing_matrix_fragmented_writes() {
    // A small write buffer fragments every payload above 512 bytes.
    assert_delivery(Role::Client, ReadPattern::AsIs, 512, SIZES).await;
    assert_delivery(Role::Server, ReadPattern::Fixed(139), 512, SIZES).await;
}

#[tokio::test]
async fn test_byte_wise_writes_deliver_one_message() {
    let (a, b) = pipe();
    let config = Config::default().with_write_buffer_size(64);
    let mut client = Connection::new(a, Role::Client, config.clone());
    let mut server = Connection::new(b, Role::Server, config);

    let payload = pattern(200);
    let mut writer = client.next_writer(OpCode::Binary).unwrap();
    for byte in &payload {
        writer.write(std::slice::from_ref(byte)).await.unwrap();
    }
    writer.close().await.unwrap();

    let (opcode, mut reader) = server.next_reader().await.unwrap();
    assert_eq!(opcode, OpCode::Binary);
    assert_eq!(reader.read_to_end().await.unwrap(), payload);
}

#[tokio::test]
async fn test_text_roundtrip_utf8() {
    let (a, b) = pipe();
    let mut client = Connection::new(a, Role::Client, Config::default());
    let mut server = Connection::new(b, Role::Server, Config::default());

    let text = "héllo wörld \u{1F310}";
    client.write_message(OpCode::Text, text.as_bytes()).await.unwrap();

    let (opcode, mut reader) = server.next_reader().await.unwrap();
    assert_eq!(opcode, OpCode::Text);
    let got = reader.read_to_end().await.unwrap();
    assert_eq!(String::from_utf8(got).unwrap(), text);
}

#[tokio::test]
async fn test_read_limit_with_interleaved_pong() {
    init_tracing();
    let (a, b) = pipe();
    // Writer buffer sized just under the limit so the oversized message
    // arrives as an in-limit first frame plus a limit-crossing tail.
    let client_config = Config::default().with_write_buffer_size(510);
    let mut client = Connection::new(a, Role::Client, client_config);
    let mut server = Connection::new(b, Role::Server, Config::default());
    server.set_read_limit(512);

    let mut writer = client.next_writer(OpCode::Binary).unwrap();
    writer.write(&[0xAB; 513]).await.unwrap(); // 510-byte frame out, 3 buffered
    writer.write_control(OpCode::Pong, b"beat", None).await.unwrap();
    writer.close().await.unwrap(); // 3-byte final continuation
    client.write_message(OpCode::Text, b"still alive").await.unwrap();

    // The reader is handed out and delivers the first 510 bytes; the read
    // that picks up the continuation behind the pong crosses the limit.
    let (opcode, mut reader) = server.next_reader().await.unwrap();
    assert_eq!(opcode, OpCode::Binary);
    let err = reader.read_to_end().await.unwrap_err();
    assert_eq!(err, Error::ReadLimitExceeded { limit: 512 });
    drop(reader);

    // Only the offending message is poisoned.
    let (opcode, mut reader) = server.next_reader().await.unwrap();
    assert_eq!(opcode, OpCode::Text);
    assert_eq!(reader.read_to_end().await.unwrap(), b"still alive");
}

#[tokio::test]
async fn test_read_limit_exempts_control_frames() {
    let (a, b) = pipe();
    let mut client = Connection::new(a, Role::Client, Config::default());
    let mut server = Connection::new(b, Role::Server, Config::default());
    server.set_read_limit(4);

    // A 100-byte ping payload dwarfs the 4-byte limit but must go through.
    client.write_control(OpCode::Ping, &[9u8; 100], None).await.unwrap();
    client.write_message(OpCode::Text, b"hi").await.unwrap();

    let (opcode, mut reader) = server.next_reader().await.unwrap();
    assert_eq!(opcode, OpCode::Text);
    assert_eq!(reader.read_to_end().await.unwrap(), b"hi");

    let (opcode, mut reader) = client.next_reader().await.unwrap();
    assert_eq!(opcode, OpCode::Pong);
    assert_eq!(reader.read_to_end().await.unwrap(), vec![9u8; 100]);
}

#[tokio::test]
async fn test_conversation_with_close_handshake() {
    let (a, b) = pipe();
    let mut client = Connection::new(a, Role::Client, Config::default());
    let mut server = Connection::new(b, Role::Server, Config::default());

    for i in 0..5u8 {
        client
            .write_message(OpCode::Text, format!("req {i}").as_bytes())
            .await
            .unwrap();
        let (_, mut reader) = server.next_reader().await.unwrap();
        let req = reader.read_to_end().await.unwrap();
        server
            .write_message(OpCode::Text, &[b"re: ".as_slice(), &req].concat())
            .await
            .unwrap();
        let (_, mut reader) = client.next_reader().await.unwrap();
        let reply = reader.read_to_end().await.unwrap();
        assert_eq!(reply, format!("re: req {i}").into_bytes());
    }

    client.close(CloseCode::Normal, "done").await.unwrap();
    let err = server.next_reader().await.unwrap_err();
    assert_eq!(err, Error::ConnectionClosed(Some(CloseCode::Normal)));
    let err = client.next_reader().await.unwrap_err();
    assert_eq!(err, Error::ConnectionClosed(Some(CloseCode::Normal)));

    // Both directions are dead afterwards.
    assert!(client.write_message(OpCode::Text, b"x").await.is_err());
    assert!(server.write_message(OpCode::Text, b"x").await.is_err());
}

#[tokio::test]
async fn test_close_reason_roundtrip() {
    let (a, b) = pipe();
    let mut client = Connection::new(a, Role::Client, Config::default());
    let mut server = Connection::new(b, Role::Server, Config::default());

    client.close(CloseCode::PolicyViolation, "nope").await.unwrap();
    let err = server.next_reader().await.unwrap_err();
    assert_eq!(err, Error::ConnectionClosed(Some(CloseCode::PolicyViolation)));
}

#[tokio::test]
async fn test_accept_unmasked_frames_escape_hatch() {
    use tokio::io::AsyncWriteExt;

    let (mut raw, b) = pipe();
    raw.write_all(&[0x81, 0x02, b'h', b'i']).await.unwrap();

    let config = Config::default().with_accept_unmasked_frames(true);
    let mut server = Connection::new(b, Role::Server, config);
    let (opcode, mut reader) = server.next_reader().await.unwrap();
    assert_eq!(opcode, OpCode::Text);
    assert_eq!(reader.read_to_end().await.unwrap(), b"hi");
}

#[tokio::test]
async fn test_client_rejects_masked_server_frame() {
    use tokio::io::AsyncWriteExt;

    let (mut raw, b) = pipe();
    // Masked text frame, which a server must never send.
    raw.write_all(&[0x81, 0x82, 1, 2, 3, 4, b'h' ^ 1, b'i' ^ 2])
        .await
        .unwrap();

    let mut client = Connection::new(b, Role::Client, Config::default());
    let err = client.next_reader().await.unwrap_err();
    assert_eq!(err, Error::MaskedServerFrame);
}
