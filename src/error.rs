//! Error types shared by the server and its sessions.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;
use crate::window::WindowError;

/// Transport failures: binding, encoding, writing or disconnecting.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] CodecError),

    #[error("disconnect did not complete within {0:?}")]
    DisconnectTimeout(Duration),

    #[error("channel closed")]
    Closed,
}

/// Errors surfaced to callers of session and server operations.
#[derive(Debug, Error)]
pub enum SmppError {
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("no response for sequence {sequence} within {timeout:?}")]
    Timeout { sequence: u32, timeout: Duration },

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("window error: {0}")]
    Window(#[from] WindowError),
}

impl SmppError {
    /// Check if this error is the expected "no response in time" outcome.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SmppError::Timeout { .. })
    }
}
