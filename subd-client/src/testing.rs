//! In-process mock server for tests.

use crate::connection::{Connection, ConnectionConfig};
use crate::stream::PeekStream;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use subd_protocol::codec::{Decoder, Encoder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};

type Handler = Box<dyn Fn(&str) -> Vec<u8> + Send + Sync>;

enum Push {
    Bytes(Vec<u8>),
    Close,
}

/// Frames reply text the way the server does.
pub(crate) fn framed(text: &str) -> Vec<u8> {
    Encoder::encode_text(text).unwrap().to_vec()
}

/// Accepts one client, records its commands and answers through a handler.
pub(crate) struct MockServer {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<String>>>,
    push: mpsc::UnboundedSender<Push>,
    gate: Option<Arc<Semaphore>>,
}

impl MockServer {
    /// Starts a server that answers every command with `reply(command)`.
    pub(crate) async fn replying<F>(reply: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::start(Box::new(move |cmd| framed(&reply(cmd))), None).await
    }

    /// Starts a server that writes `raw(command)` verbatim after each command.
    pub(crate) async fn raw<F>(raw: F) -> Self
    where
        F: Fn(&str) -> Vec<u8> + Send + Sync + 'static,
    {
        Self::start(Box::new(raw), None).await
    }

    /// Like [`MockServer::replying`], but each reply waits for [`MockServer::release`].
    pub(crate) async fn gated<F>(reply: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let gate = Arc::new(Semaphore::new(0));
        Self::start(Box::new(move |cmd| framed(&reply(cmd))), Some(gate)).await
    }

    async fn start(handler: Handler, gate: Option<Arc<Semaphore>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let (push, mut push_rx) = mpsc::unbounded_channel();

        let seen = commands.clone();
        let reply_gate = gate.clone();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = socket.into_split();
            let mut decoder = Decoder::new();
            let mut buf = vec![0u8; 8192];

            loop {
                tokio::select! {
                    read = reader.read(&mut buf) => {
                        let n = match read {
                            Ok(0) | Err(_) => break,
                            Ok(n) => n,
                        };
                        decoder.extend(&buf[..n]);
                        while let Some(command) = decoder.decode_text().unwrap() {
                            seen.lock().unwrap().push(command.clone());
                            if let Some(gate) = &reply_gate {
                                gate.acquire().await.unwrap().forget();
                            }
                            if writer.write_all(&handler(&command)).await.is_err() {
                                return;
                            }
                        }
                    }
                    push = push_rx.recv() => match push {
                        Some(Push::Bytes(bytes)) => {
                            if writer.write_all(&bytes).await.is_err() {
                                return;
                            }
                        }
                        Some(Push::Close) | None => return,
                    }
                }
            }
        });

        Self {
            addr,
            commands,
            push,
            gate,
        }
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.addr.ip().to_string(), self.addr.port())
    }

    /// Opens a client connection to this server.
    pub(crate) async fn connect(&self) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(self.config()));
        conn.connect().await.unwrap();
        conn
    }

    /// Commands received so far, in order.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Waits until at least `n` commands were received.
    pub(crate) async fn wait_for_commands(&self, n: usize) {
        for _ in 0..400 {
            if self.commands.lock().unwrap().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("server did not receive {} commands", n);
    }

    /// Pushes a change notification to the client.
    pub(crate) fn notify(&self) {
        self.push_bytes(Encoder::encode_notification().to_vec());
    }

    pub(crate) fn push_bytes(&self, bytes: Vec<u8>) {
        let _ = self.push.send(Push::Bytes(bytes));
    }

    /// Closes the client socket.
    pub(crate) fn disconnect(&self) {
        let _ = self.push.send(Push::Close);
    }

    /// Lets one gated reply through.
    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

/// Socket call counters shared with a [`CountingStream`].
#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub(crate) reads: AtomicUsize,
    pub(crate) peeks: AtomicUsize,
}

impl Calls {
    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn peeks(&self) -> usize {
        self.peeks.load(Ordering::SeqCst)
    }
}

/// A TCP stream that counts read and peek calls.
pub(crate) struct CountingStream {
    inner: TcpStream,
    calls: Arc<Calls>,
}

impl CountingStream {
    pub(crate) async fn connect(addr: SocketAddr) -> (Self, Arc<Calls>) {
        let inner = TcpStream::connect(addr).await.unwrap();
        let calls = Arc::new(Calls::default());
        (
            Self {
                inner,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl AsyncRead for CountingStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.calls.reads.fetch_add(1, Ordering::SeqCst);
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for CountingStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl PeekStream for CountingStream {
    fn poll_peek(&self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<usize>> {
        self.calls.peeks.fetch_add(1, Ordering::SeqCst);
        self.inner.poll_peek(cx, buf)
    }
}

/// A stream whose writes fail as if the peer had reset the connection.
/// Reads and peeks never complete.
pub(crate) struct BrokenPipeStream;

impl AsyncRead for BrokenPipeStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for BrokenPipeStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl PeekStream for BrokenPipeStream {
    fn poll_peek(&self, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<usize>> {
        Poll::Pending
    }
}
