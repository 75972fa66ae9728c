//! SMPP server: listening endpoint, session registry and lifecycle.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, span, warn, Instrument, Level};

use crate::config::{ServerConfig, SessionConfig};
use crate::error::{ChannelError, SmppError};
use crate::management::{
    server_object_name, session_object_name, ManagementRegistry, Managed, NoopRegistry,
    ServerBean, SessionBean,
};
use crate::processor::{DefaultPacketProcessor, PacketProcessor, SessionListener};
use crate::telemetry::counters;

use super::acceptor;
use super::connection::{Channel, ConnectionId, TcpChannel};
use super::registry::SessionRegistry;
use super::session::SmppSession;

/// Server lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl ServerStatus {
    fn gauge(self) -> i64 {
        match self {
            ServerStatus::Stopped => 0,
            ServerStatus::Starting => 1,
            ServerStatus::Started => 2,
            ServerStatus::Stopping => 3,
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Stopped => write!(f, "STOPPED"),
            ServerStatus::Starting => write!(f, "STARTING"),
            ServerStatus::Started => write!(f, "STARTED"),
            ServerStatus::Stopping => write!(f, "STOPPING"),
        }
    }
}

/// Running accept loop.
struct Endpoint {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

struct ServerInner {
    config: ServerConfig,
    session_config: SessionConfig,
    status: Mutex<ServerStatus>,
    endpoint: Mutex<Option<Endpoint>>,
    started_at: Mutex<Option<Instant>>,
    processor: RwLock<Arc<dyn PacketProcessor>>,
    listener: RwLock<Option<Arc<dyn SessionListener>>>,
    registry: SessionRegistry,
    management: Arc<dyn ManagementRegistry>,
    next_connection_id: AtomicU64,
    next_session_id: AtomicU32,
    created_sessions: AtomicU64,
    destroyed_sessions: AtomicU64,
}

/// SMPP server. Clones share the same server.
#[derive(Clone)]
pub struct SmppServer {
    inner: Arc<ServerInner>,
}

impl SmppServer {
    /// Create a stopped server that answers every request with OK until a
    /// processor is set.
    pub fn new(config: ServerConfig, session_config: SessionConfig) -> Self {
        Self::with_management(config, session_config, Arc::new(NoopRegistry))
    }

    /// Create a stopped server publishing itself and its sessions to
    /// `management`.
    pub fn with_management(
        config: ServerConfig,
        session_config: SessionConfig,
        management: Arc<dyn ManagementRegistry>,
    ) -> Self {
        let server = Self {
            inner: Arc::new(ServerInner {
                config,
                session_config,
                status: Mutex::new(ServerStatus::Stopped),
                endpoint: Mutex::new(None),
                started_at: Mutex::new(None),
                processor: RwLock::new(Arc::new(DefaultPacketProcessor::new())),
                listener: RwLock::new(None),
                registry: SessionRegistry::new(),
                management,
                next_connection_id: AtomicU64::new(1),
                next_session_id: AtomicU32::new(1),
                created_sessions: AtomicU64::new(0),
                destroyed_sessions: AtomicU64::new(0),
            }),
        };

        let bean = Arc::new(ServerBean::new(server.downgrade()));
        server.register_object(&server_object_name(server.name()), bean);
        server
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn status(&self) -> ServerStatus {
        *lock(&self.inner.status)
    }

    /// Address the server is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.inner.endpoint).as_ref().map(|e| e.local_addr)
    }

    /// Time since the last successful start, while running.
    pub fn uptime(&self) -> Option<Duration> {
        lock(&self.inner.started_at).map(|at| at.elapsed())
    }

    pub fn created_sessions(&self) -> u64 {
        self.inner.created_sessions.load(Ordering::Relaxed)
    }

    pub fn destroyed_sessions(&self) -> u64 {
        self.inner.destroyed_sessions.load(Ordering::Relaxed)
    }

    pub async fn active_sessions(&self) -> usize {
        self.inner.registry.count().await
    }

    /// Snapshot of the registered sessions.
    pub async fn sessions(&self) -> Vec<SmppSession> {
        self.inner
            .registry
            .snapshot()
            .await
            .into_iter()
            .map(|(_, session)| session)
            .collect()
    }

    pub fn packet_processor(&self) -> Arc<dyn PacketProcessor> {
        self.inner
            .processor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set the processor for sessions created from now on. Open sessions
    /// keep the one they were created with.
    pub fn set_packet_processor(&self, processor: Arc<dyn PacketProcessor>) {
        *self
            .inner
            .processor
            .write()
            .unwrap_or_else(PoisonError::into_inner) = processor;
    }

    pub fn set_session_listener(&self, listener: Arc<dyn SessionListener>) {
        *self
            .inner
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub fn downgrade(&self) -> WeakServer {
        WeakServer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Bind the listening endpoint and start accepting connections.
    ///
    /// Only valid while stopped; otherwise logs a warning and does nothing.
    /// A bind failure leaves the server stopped.
    pub async fn start(&self) -> Result<(), SmppError> {
        if let Err(current) = self.transition(ServerStatus::Stopped, ServerStatus::Starting) {
            warn!(server = %self.name(), status = %current, "server can't be started from this status");
            return Ok(());
        }

        let address = self.inner.config.address;
        info!(server = %self.name(), %address, "starting server");

        let listener = match TcpListener::bind(address).await {
            Ok(listener) => listener,
            Err(source) => {
                self.set_status(ServerStatus::Stopped);
                error!(server = %self.name(), %address, error = %source, "failed to bind");
                return Err(ChannelError::Bind { address, source }.into());
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.set_status(ServerStatus::Stopped);
                return Err(ChannelError::Io(e).into());
            }
        };

        let shutdown = CancellationToken::new();
        let span = span!(Level::INFO, "listener", server = %self.name(), address = %local_addr);
        let task = tokio::spawn(
            acceptor::run(listener, self.downgrade(), shutdown.clone()).instrument(span),
        );

        *lock(&self.inner.endpoint) = Some(Endpoint {
            local_addr,
            shutdown,
            task,
        });
        *lock(&self.inner.started_at) = Some(Instant::now());
        self.set_status(ServerStatus::Started);

        info!(server = %self.name(), address = %local_addr, "server started");
        Ok(())
    }

    /// Disconnect every session and close the listening endpoint.
    ///
    /// Only valid while started; otherwise logs a warning and does nothing.
    /// Each session gets a bounded wait; failures are logged and skipped.
    pub async fn stop(&self) {
        if let Err(current) = self.transition(ServerStatus::Started, ServerStatus::Stopping) {
            warn!(server = %self.name(), status = %current, "server can't be stopped from this status");
            return;
        }

        info!(server = %self.name(), "stopping server");
        self.disconnect_all().await;

        let endpoint = lock(&self.inner.endpoint).take();
        if let Some(endpoint) = endpoint {
            endpoint.shutdown.cancel();
            if let Err(e) = endpoint.task.await {
                warn!(server = %self.name(), error = %e, "acceptor task failed");
            }
        }

        // A connection accepted while the first pass ran is registered by
        // now; the acceptor has been joined, so nothing else can arrive.
        self.disconnect_all().await;

        *lock(&self.inner.started_at) = None;
        self.set_status(ServerStatus::Stopped);
        info!(server = %self.name(), "server stopped");
    }

    /// Disconnect and forget every registered session, waiting at most
    /// `disconnect_timeout` for each.
    async fn disconnect_all(&self) {
        let sessions = self.inner.registry.snapshot().await;
        if sessions.is_empty() {
            return;
        }
        debug!(server = %self.name(), sessions = sessions.len(), "disconnecting sessions");

        let wait = self.inner.config.disconnect_timeout;
        for (connection, session) in sessions {
            match tokio::time::timeout(wait, session.disconnect()).await {
                Ok(Ok(())) => debug!(session = session.id(), "session disconnected"),
                Ok(Err(e)) => {
                    warn!(session = session.id(), error = %e, "failed to disconnect session")
                }
                Err(_) => {
                    let e = ChannelError::DisconnectTimeout(wait);
                    warn!(session = session.id(), error = %e, "failed to disconnect session")
                }
            }
            // The connection task fires this too; whichever runs first wins.
            self.on_disconnected(connection).await;
        }
    }

    /// Create, register and run a session for an accepted connection.
    pub(crate) async fn on_connected(&self, stream: TcpStream, peer: SocketAddr) {
        if self.status() != ServerStatus::Started {
            debug!(%peer, "server not started, dropping connection");
            return;
        }

        let (reader, writer) = stream.into_split();
        let (connection, session) = self
            .register_session(Arc::new(TcpChannel::new(writer, peer)))
            .await;
        info!(session = session.id(), %connection, %peer, "session created");

        let span = span!(Level::INFO, "session", id = session.id(), %peer);
        let server = self.clone();
        tokio::spawn(
            async move {
                session.run(reader).await;
                server.on_disconnected(connection).await;
            }
            .instrument(span),
        );
    }

    /// Create a session over `channel` and register it.
    async fn register_session(&self, channel: Arc<dyn Channel>) -> (ConnectionId, SmppSession) {
        let connection = ConnectionId(self.inner.next_connection_id.fetch_add(1, Ordering::Relaxed));
        let session_id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);

        let session = SmppSession::new(
            session_id,
            channel,
            self.packet_processor(),
            self.inner.session_config.clone(),
            self.inner.config.system_id.clone(),
        );

        self.inner.registry.insert(connection, session.clone()).await;
        self.inner.created_sessions.fetch_add(1, Ordering::Relaxed);
        counters::session_created(self.name(), self.inner.registry.count().await);

        let bean = Arc::new(SessionBean::new(session.downgrade()));
        self.register_object(&session_object_name(self.name(), session_id), bean);

        if let Some(listener) = self.session_listener() {
            listener.created(&session);
        }

        (connection, session)
    }

    /// Forget the session of a closed connection. Safe to call twice.
    pub(crate) async fn on_disconnected(&self, connection: ConnectionId) {
        let Some(session) = self.inner.registry.remove(connection).await else {
            return;
        };

        self.inner.destroyed_sessions.fetch_add(1, Ordering::Relaxed);
        counters::session_destroyed(
            self.name(),
            self.inner.registry.count().await,
            session.lifetime().as_secs_f64(),
        );

        let name = session_object_name(self.name(), session.id());
        if let Err(e) = self.inner.management.unregister(&name) {
            warn!(%name, error = %e, "failed to unregister management object");
        }

        if let Some(listener) = self.session_listener() {
            listener.destroyed(&session);
        }

        info!(session = session.id(), %connection, "session destroyed");
    }

    fn session_listener(&self) -> Option<Arc<dyn SessionListener>> {
        self.inner
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn register_object(&self, name: &str, object: Arc<dyn Managed>) {
        if let Err(e) = self.inner.management.register(name, object) {
            warn!(%name, error = %e, "failed to register management object");
        }
    }

    fn transition(&self, from: ServerStatus, to: ServerStatus) -> Result<(), ServerStatus> {
        let mut status = lock(&self.inner.status);
        if *status != from {
            return Err(*status);
        }
        *status = to;
        counters::server_status(&self.inner.config.name, to.gauge());
        Ok(())
    }

    fn set_status(&self, to: ServerStatus) {
        *lock(&self.inner.status) = to;
        counters::server_status(&self.inner.config.name, to.gauge());
    }
}

impl fmt::Debug for SmppServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmppServer")
            .field("name", &self.name())
            .field("status", &self.status())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

/// Non-owning server handle.
#[derive(Clone)]
pub struct WeakServer {
    inner: Weak<ServerInner>,
}

impl WeakServer {
    pub fn upgrade(&self) -> Option<SmppServer> {
        self.inner.upgrade().map(|inner| SmppServer { inner })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::listener::connection::mock::MockChannel;
    use crate::management::InMemoryRegistry;

    /// Channel whose disconnect always fails.
    struct BrokenChannel;

    #[async_trait]
    impl Channel for BrokenChannel {
        async fn write(&self, _frame: Bytes) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), ChannelError> {
            Err(ChannelError::Closed)
        }

        fn peer_addr(&self) -> Option<SocketAddr> {
            None
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    /// Channel whose disconnect never completes in time.
    struct StuckChannel;

    #[async_trait]
    impl Channel for StuckChannel {
        async fn write(&self, _frame: Bytes) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), ChannelError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }

        fn peer_addr(&self) -> Option<SocketAddr> {
            None
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn local_config() -> ServerConfig {
        ServerConfig {
            address: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let server = SmppServer::new(local_config(), SessionConfig::default());
        assert_eq!(server.status(), ServerStatus::Stopped);
        assert!(server.local_addr().is_none());

        server.start().await.unwrap();
        assert_eq!(server.status(), ServerStatus::Started);
        assert!(server.local_addr().unwrap().port() > 0);
        assert!(server.uptime().is_some());

        server.stop().await;
        assert_eq!(server.status(), ServerStatus::Stopped);
        assert!(server.local_addr().is_none());
        assert!(server.uptime().is_none());
    }

    #[tokio::test]
    async fn test_start_and_stop_outside_valid_status_are_noops() {
        let server = SmppServer::new(local_config(), SessionConfig::default());

        server.stop().await;
        assert_eq!(server.status(), ServerStatus::Stopped);

        server.start().await.unwrap();
        let addr = server.local_addr();
        server.start().await.unwrap();
        assert_eq!(server.status(), ServerStatus::Started);
        assert_eq!(server.local_addr(), addr);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_server_stopped() {
        let first = SmppServer::new(local_config(), SessionConfig::default());
        first.start().await.unwrap();

        let taken = ServerConfig {
            address: first.local_addr().unwrap(),
            ..Default::default()
        };
        let second = SmppServer::new(taken, SessionConfig::default());
        let err = second.start().await.unwrap_err();

        assert!(matches!(err, SmppError::Channel(ChannelError::Bind { .. })));
        assert_eq!(second.status(), ServerStatus::Stopped);
        first.stop().await;
    }

    #[tokio::test]
    async fn test_stop_survives_failing_and_stuck_disconnects() {
        let server = SmppServer::new(
            ServerConfig {
                disconnect_timeout: Duration::from_millis(100),
                ..local_config()
            },
            SessionConfig::default(),
        );
        server.start().await.unwrap();

        let healthy = MockChannel::new();
        server.register_session(Arc::new(BrokenChannel)).await;
        server.register_session(Arc::new(StuckChannel)).await;
        server.register_session(healthy.clone()).await;
        assert_eq!(server.active_sessions().await, 3);

        tokio::time::timeout(Duration::from_secs(5), server.stop())
            .await
            .unwrap();

        assert_eq!(healthy.disconnects(), 1);
        assert_eq!(server.status(), ServerStatus::Stopped);
        assert_eq!(server.active_sessions().await, 0);
        assert_eq!(server.destroyed_sessions(), 3);
    }

    #[tokio::test]
    async fn test_stop_disconnects_session_registered_during_shutdown() {
        let server = SmppServer::new(
            ServerConfig {
                disconnect_timeout: Duration::from_millis(300),
                ..local_config()
            },
            SessionConfig::default(),
        );
        server.start().await.unwrap();
        server.register_session(Arc::new(StuckChannel)).await;

        // Lands while stop is still waiting on the stuck session, after the
        // first snapshot was taken.
        let late = MockChannel::new();
        let registering = {
            let server = server.clone();
            let late = late.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                server.register_session(late).await
            })
        };

        server.stop().await;
        let (_, session) = registering.await.unwrap();

        assert_eq!(late.disconnects(), 1);
        assert_eq!(session.status(), crate::listener::SessionStatus::Closed);
        assert_eq!(server.active_sessions().await, 0);
        assert_eq!(server.status(), ServerStatus::Stopped);
    }

    #[tokio::test]
    async fn test_server_registers_management_object() {
        let management = Arc::new(InMemoryRegistry::new());
        let server = SmppServer::with_management(
            ServerConfig {
                name: "edge".into(),
                ..local_config()
            },
            SessionConfig::default(),
            management.clone(),
        );

        let bean = management.get("smppserver:type=Server,name=edge").unwrap();
        assert_eq!(bean.attributes().await["status"], "STOPPED");

        bean.invoke("start").await.unwrap();
        assert_eq!(server.status(), ServerStatus::Started);
        assert_eq!(bean.attributes().await["activeSessions"], "0");

        bean.invoke("stop").await.unwrap();
        assert_eq!(server.status(), ServerStatus::Stopped);
    }
}
