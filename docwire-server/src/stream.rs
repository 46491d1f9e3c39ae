//! Accepted client connections, plain TCP or server-side TLS.

use crate::error::ServerError;
use pin_project_lite::pin_project;
use std::io::{self, IoSlice};
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

pin_project! {
    #[project = TransportProj]
    enum Transport {
        Tcp { #[pin] tcp: TcpStream },
        Tls { #[pin] tls: TlsStream<TcpStream> },
    }
}

pin_project! {
    /// A client connection after the optional TLS handshake.
    ///
    /// The peer address is captured at accept time so it stays available
    /// for logging after the socket has failed.
    pub struct ClientStream {
        peer: SocketAddr,
        #[pin]
        transport: Transport,
    }
}

impl ClientStream {
    /// Wraps an accepted socket, running the TLS handshake when an acceptor
    /// is configured. `TCP_NODELAY` is set first; replies are always written
    /// whole and flushed.
    pub async fn accept(
        tcp: TcpStream,
        peer: SocketAddr,
        acceptor: Option<&TlsAcceptor>,
    ) -> Result<Self, ServerError> {
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!("[{}] Failed to set TCP_NODELAY: {}", peer, e);
        }

        let transport = match acceptor {
            Some(acceptor) => {
                tracing::debug!("[{}] Performing TLS handshake", peer);
                let tls = acceptor
                    .accept(tcp)
                    .await
                    .map_err(|e| ServerError::TlsHandshake(e.to_string()))?;
                tracing::debug!("[{}] TLS handshake complete", peer);
                Transport::Tls { tls }
            }
            None => Transport::Tcp { tcp },
        };
        Ok(Self { peer, transport })
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.transport, Transport::Tls { .. })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn socket(&self) -> &TcpStream {
        match &self.transport {
            Transport::Tcp { tcp } => tcp,
            Transport::Tls { tls } => tls.get_ref().0,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket().local_addr()
    }
}

impl AsyncRead for ClientStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project().transport.project() {
            TransportProj::Tcp { tcp } => tcp.poll_read(cx, buf),
            TransportProj::Tls { tls } => tls.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ClientStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project().transport.project() {
            TransportProj::Tcp { tcp } => tcp.poll_write(cx, buf),
            TransportProj::Tls { tls } => tls.poll_write(cx, buf),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.project().transport.project() {
            TransportProj::Tcp { tcp } => tcp.poll_write_vectored(cx, bufs),
            TransportProj::Tls { tls } => tls.poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match &self.transport {
            Transport::Tcp { tcp } => tcp.is_write_vectored(),
            Transport::Tls { tls } => tls.is_write_vectored(),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project().transport.project() {
            TransportProj::Tcp { tcp } => tcp.poll_flush(cx),
            TransportProj::Tls { tls } => tls.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project().transport.project() {
            TransportProj::Tcp { tcp } => tcp.poll_shutdown(cx),
            TransportProj::Tls { tls } => tls.poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_plain_stream_passthrough() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut socket = TcpStream::connect(addr).await.unwrap();
            socket.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let (tcp, peer) = listener.accept().await.unwrap();
        let mut stream = ClientStream::accept(tcp, peer, None).await.unwrap();
        assert!(!stream.is_tls());
        assert_eq!(stream.peer_addr(), peer);
        assert_eq!(stream.local_addr().unwrap(), addr);
        assert!(stream.socket().nodelay().unwrap());

        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        stream.write_all(b"pong").await.unwrap();
        stream.flush().await.unwrap();

        assert_eq!(&client.await.unwrap(), b"pong");
    }
}
