//! Relay - bidirectional byte copy between two established connections
//!
//! ```text
//!   a.read ──upload──▶ b.write
//!   a.write ◀─download── b.read
//! ```
//!
//! Both directions run concurrently and are joined. End-of-stream on one
//! side is propagated as a write shutdown to the other peer while the
//! opposite direction keeps draining. An error in either direction cancels
//! the other and tears the pair down.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::common::Result;
use crate::error::Error;

/// Relay buffer size (32KB)
const RELAY_BUFFER_SIZE: usize = 32 * 1024;

/// Bytes moved in each direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// `a` → `b`
    pub upload: u64,
    /// `b` → `a`
    pub download: u64,
}

/// Relay until both directions reach end-of-stream or either one fails.
///
/// Takes ownership of both ends; they are dropped (closed) on return.
pub async fn relay<A, B>(a: A, b: B) -> Result<RelayStats>
where
    A: AsyncRead + AsyncWrite + Unpin + Send,
    B: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let upload = copy_half(&mut a_read, &mut b_write, "upload");
    let download = copy_half(&mut b_read, &mut a_write, "download");

    let (upload, download) = tokio::try_join!(upload, download)?;
    Ok(RelayStats { upload, download })
}

/// Copy one direction, then shut the destination's write side down.
async fn copy_half<R, W>(reader: &mut R, writer: &mut W, direction: &'static str) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let relay_err = |source| Error::RelayIo { direction, source };

    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total: u64 = 0;

    loop {
        let n = reader.read(&mut buf).await.map_err(relay_err)?;
        if n == 0 {
            break;
        }

        writer.write_all(&buf[..n]).await.map_err(relay_err)?;
        // Flush to ensure data is sent immediately
        writer.flush().await.map_err(relay_err)?;

        total += n as u64;
    }

    trace!("{} reached end of stream after {} bytes", direction, total);

    // The peer may have closed already; the bytes are delivered either way
    if let Err(e) = writer.shutdown().await {
        trace!("{} shutdown: {}", direction, e);
    }
    Ok(total)
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Write `payload` (then a zero-length write and EOF) while reading
    /// everything the other side sends.
    async fn exchange(stream: tokio::io::DuplexStream, payload: Vec<u8>) -> Vec<u8> {
        let (mut rd, mut wr) = tokio::io::split(stream);
        let write = async move {
            wr.write_all(&payload).await.unwrap();
            wr.write_all(b"").await.unwrap();
            wr.shutdown().await.unwrap();
        };
        let read = async move {
            let mut got = Vec::new();
            rd.read_to_end(&mut got).await.unwrap();
            got
        };
        tokio::join!(write, read).1
    }

    #[tokio::test]
    async fn test_relay_is_byte_preserving_both_ways() {
        let (client, a) = tokio::io::duplex(1024);
        let (b, backend) = tokio::io::duplex(1024);

        let relay = tokio::spawn(relay(a, b));

        // Larger than both the duplex buffers and one relay chunk
        let upload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let download = b"pong".repeat(10_000);

        let expected_up = upload.clone();
        let expected_down = download.clone();

        let client_side = tokio::spawn(exchange(client, upload));
        let backend_side = tokio::spawn(exchange(backend, download));

        assert_eq!(backend_side.await.unwrap(), expected_up);
        assert_eq!(client_side.await.unwrap(), expected_down);

        let stats = relay.await.unwrap().unwrap();
        assert_eq!(stats.upload, 100_000);
        assert_eq!(stats.download, 40_000);
    }

    #[tokio::test]
    async fn test_relay_empty_streams() {
        let (mut client, a) = tokio::io::duplex(64);
        let (b, mut backend) = tokio::io::duplex(64);
        client.shutdown().await.unwrap();
        backend.shutdown().await.unwrap();

        let stats = relay(a, b).await.unwrap();
        assert_eq!(stats, RelayStats::default());
    }

    #[tokio::test]
    async fn test_half_close_keeps_other_direction() {
        let (mut client, a) = tokio::io::duplex(64);
        let (b, mut backend) = tokio::io::duplex(64);
        let relay = tokio::spawn(relay(a, b));

        // Client is done sending before the reply is written
        client.write_all(b"request").await.unwrap();
        client.shutdown().await.unwrap();

        let mut got = Vec::new();
        backend.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"request");

        backend.write_all(b"late reply").await.unwrap();
        backend.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"late reply");
        relay.await.unwrap().unwrap();
    }

    /// Stream whose reads always fail
    struct Broken;

    impl AsyncRead for Broken {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::ErrorKind::ConnectionReset.into()))
        }
    }

    impl AsyncWrite for Broken {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_error_tears_down_pair() {
        // The backend never sends or closes; the error must still end the relay
        let (b, _backend) = tokio::io::duplex(64);

        let err = relay(Broken, b).await.unwrap_err();
        assert!(matches!(err, Error::RelayIo { direction: "upload", .. }));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00MB");
    }
}
