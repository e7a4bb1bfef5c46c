//! Stream abstraction for the transport session.

use std::io;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// A byte stream that can also be inspected without consuming data.
///
/// Implemented for [`TcpStream`]; tests wrap it to count socket calls.
pub trait PeekStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Attempts to peek at buffered data without removing it.
    fn poll_peek(&self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<usize>>;
}

impl PeekStream for TcpStream {
    fn poll_peek(&self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<usize>> {
        TcpStream::poll_peek(self, cx, buf)
    }
}

/// Peeks once without waiting.
///
/// Returns `Ok(None)` when no data is ready, `Ok(Some(0))` at end of stream,
/// and `Ok(Some(n))` when `n` bytes were copied into `buf`.
pub async fn try_peek<S: PeekStream>(stream: &S, buf: &mut [u8]) -> io::Result<Option<usize>> {
    let mut read_buf = ReadBuf::new(buf);
    let polled = std::future::poll_fn(|cx| Poll::Ready(stream.poll_peek(cx, &mut read_buf))).await;
    match polled {
        Poll::Ready(Ok(n)) => Ok(Some(n)),
        Poll::Ready(Err(e)) => Err(e),
        Poll::Pending => Ok(None),
    }
}
