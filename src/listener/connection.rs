//! Connection handling for SMPP sessions.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ChannelError;

/// Unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound side of a client connection.
///
/// Sessions only write whole encoded PDUs and ask for the link to be torn
/// down; reading is driven separately by the session's read loop.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Write one encoded PDU and wait until it is flushed.
    async fn write(&self, frame: Bytes) -> Result<(), ChannelError>;

    /// Close the outbound side. Calling this more than once is harmless.
    async fn disconnect(&self) -> Result<(), ChannelError>;

    fn peer_addr(&self) -> Option<SocketAddr>;

    fn is_connected(&self) -> bool;
}

/// [`Channel`] over the write half of a TCP stream.
pub struct TcpChannel {
    peer_addr: SocketAddr,
    writer: Mutex<Option<OwnedWriteHalf>>,
    connected: AtomicBool,
}

impl TcpChannel {
    pub fn new(writer: OwnedWriteHalf, peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            writer: Mutex::new(Some(writer)),
            connected: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Channel for TcpChannel {
    async fn write(&self, frame: Bytes) -> Result<(), ChannelError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ChannelError::Closed)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChannelError> {
        self.connected.store(false, Ordering::SeqCst);
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            debug!(peer = %self.peer_addr, "closing connection");
            writer.shutdown().await?;
        }
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer_addr)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for TcpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpChannel")
            .field("peer_addr", &self.peer_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}
