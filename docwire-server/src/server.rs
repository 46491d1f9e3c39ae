//! TCP server implementation.

use crate::config::Config;
use crate::error::ServerError;
use crate::handler::{error_reply, CommandHandler, Request};
use crate::session::Session;
use crate::stream::ClientStream;
use crate::tls;
use docwire_protocol::{read_message, write_message, Encoder, Message, Op, MAX_MESSAGE_SIZE};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Largest accepted request message.
    pub max_message_size: usize,
    /// Append a checksum to every OP_MSG reply.
    pub checksum_replies: bool,
    /// TLS acceptor (if TLS is enabled).
    pub tls_acceptor: Option<Arc<TlsAcceptor>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_connections", &self.max_connections)
            .field("max_message_size", &self.max_message_size)
            .field("checksum_replies", &self.checksum_replies)
            .field("tls_enabled", &self.tls_acceptor.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_config_without_tls(&Config::default())
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builds the runtime configuration, loading TLS material if enabled.
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        config.validate()?;
        let mut server_config = Self::from_config_without_tls(config);
        if config.tls.enabled {
            server_config = server_config.with_tls(tls::create_tls_acceptor(&config.tls)?);
        }
        Ok(server_config)
    }

    fn from_config_without_tls(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            idle_timeout: config.network.idle_timeout(),
            max_connections: config.network.max_connections,
            max_message_size: config.limits.max_message_size.min(MAX_MESSAGE_SIZE),
            checksum_replies: config.limits.checksum_replies,
            tls_acceptor: None,
        }
    }

    /// Sets the TLS acceptor.
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls_acceptor = Some(Arc::new(acceptor));
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Returns whether TLS is enabled.
    pub fn tls_enabled(&self) -> bool {
        self.tls_acceptor.is_some()
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// State shared by every connection task.
struct Shared {
    config: ServerConfig,
    handler: Arc<dyn CommandHandler>,
    encoder: Encoder,
    stats: Arc<ServerStats>,
}

/// MongoDB wire protocol server.
pub struct Server {
    shared: Arc<Shared>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server dispatching commands to `handler`.
    pub fn new(config: ServerConfig, handler: Arc<dyn CommandHandler>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let encoder = Encoder::new().with_checksum(config.checksum_replies);
        Self {
            shared: Arc::new(Shared {
                config,
                handler,
                encoder,
                stats: Arc::new(ServerStats::default()),
            }),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.shared.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);

        let tls_mode = if self.shared.config.tls_enabled() {
            "TLS"
        } else {
            "plain"
        };
        tracing::info!(
            "Server listening on {} ({})",
            listener.local_addr()?,
            tls_mode
        );

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => self.accept(tcp_stream, addr),
                        Err(e) => tracing::error!("Accept error: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn accept(&self, tcp_stream: TcpStream, addr: SocketAddr) {
        let stats = &self.shared.stats;
        if stats.connections_active.load(Ordering::Relaxed)
            >= self.shared.config.max_connections as u64
        {
            tracing::warn!("Connection limit reached, rejecting {}", addr);
            stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let connection_id = stats.connections_total.fetch_add(1, Ordering::Relaxed) + 1;
        stats.connections_active.fetch_add(1, Ordering::Relaxed);

        let shared = self.shared.clone();
        let mut conn_shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let tls_acceptor = shared.config.tls_acceptor.clone();
            let acceptor = tls_acceptor.as_deref();
            let stream = match ClientStream::accept(tcp_stream, addr, acceptor).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("[{}] TLS handshake failed: {}", addr, e);
                    shared.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                    shared.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                    return;
                }
            };

            let session = Session::new(connection_id, addr, stream.is_tls());
            let result =
                Self::handle_connection(stream, session, &shared, &mut conn_shutdown).await;

            match result {
                Ok(()) | Err(ServerError::ShuttingDown) => {}
                Err(e) => {
                    tracing::warn!("[{}] Closing connection: {}", addr, e);
                    shared.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                }
            }

            shared.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
            tracing::info!("Client disconnected: {}", addr);
        });
    }

    /// Reads, dispatches and answers messages one at a time until the
    /// client leaves, the connection idles out, or the server shuts down.
    async fn handle_connection(
        stream: ClientStream,
        mut session: Session,
        shared: &Shared,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = session.remote_addr;
        let tls_status = if session.is_tls() { " (TLS)" } else { "" };
        tracing::info!(
            "Client connected: {}{} (conn{})",
            addr,
            tls_status,
            session.connection_id
        );

        let mut stream = BufReader::new(stream);
        let config = &shared.config;

        loop {
            let message = tokio::select! {
                result = read_message(&mut stream, config.max_message_size) => {
                    match result {
                        Ok(Some(message)) => message,
                        Ok(None) => {
                            tracing::debug!("[{}] Connection closed by client", addr);
                            return Ok(());
                        }
                        Err(e) => return Err(e.into()),
                    }
                }

                _ = tokio::time::sleep(config.idle_timeout) => {
                    tracing::debug!("[{}] Idle timeout", addr);
                    return Ok(());
                }

                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    return Err(ServerError::ShuttingDown);
                }
            };

            session.touch();
            shared.stats.requests_total.fetch_add(1, Ordering::Relaxed);

            let more_to_come = matches!(&message.op, Op::Msg(msg) if msg.flags.more_to_come());
            let body = Self::dispatch(shared, &mut session, &message)?;

            if more_to_come {
                tracing::debug!(
                    "[{}] moreToCome set, no reply (id={})",
                    addr,
                    message.request_id
                );
                continue;
            }

            let reply = shared.encoder.reply(&message, body);
            write_message(&mut stream, &reply).await?;
        }
    }

    /// Runs the handler and converts non-fatal errors into error replies.
    fn dispatch(
        shared: &Shared,
        session: &mut Session,
        message: &Message,
    ) -> Result<docwire_bson::Document, ServerError> {
        let addr = session.remote_addr;
        let result = Request::from_message(message).and_then(|request| {
            tracing::debug!(
                "[{}] Command: {}.{} (id={})",
                addr,
                request.database,
                request.name(),
                request.request_id
            );
            shared.handler.handle(session, &request)
        });

        match result {
            Ok(body) => Ok(body),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::debug!("[{}] Command failed: {}", addr, e);
                shared.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                Ok(error_reply(&e))
            }
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.shared.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandshakeHandler;

    #[test]
    fn test_server_config_from_config() {
        let mut config = Config::default();
        config.network.idle_timeout_secs = 9;
        config.limits.checksum_replies = true;
        config.limits.max_message_size = 4096;

        let server_config = ServerConfig::from_config(&config).unwrap();
        assert_eq!(server_config.idle_timeout, Duration::from_secs(9));
        assert_eq!(server_config.max_message_size, 4096);
        assert!(server_config.checksum_replies);
        assert!(!server_config.tls_enabled());
        assert!(format!("{:?}", server_config).contains("tls_enabled: false"));
    }

    #[test]
    fn test_server_config_rejects_invalid() {
        let mut config = Config::default();
        config.tls.enabled = true;
        assert!(matches!(
            ServerConfig::from_config(&config),
            Err(ServerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_server_basic() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        let server = Server::new(config, Arc::new(HandshakeHandler::new()));
        assert!(!server.is_running());
        assert_eq!(server.stats().connections_total.load(Ordering::Relaxed), 0);
    }
}
