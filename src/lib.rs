//! SMPP server endpoint.
//!
//! Accepts client (ESME) connections, negotiates binds, hands incoming
//! requests to a [`PacketProcessor`] and correlates the server's own requests
//! with their responses through a bounded [`Window`].

pub mod codec;
pub mod config;
pub mod error;
pub mod listener;
pub mod management;
pub mod packet;
pub mod processor;
pub mod telemetry;
pub mod window;

pub use error::{ChannelError, SmppError};
pub use listener::{
    ResponseSender, ServerStatus, SessionStatus, SmppServer, SmppSession, WeakServer, WeakSession,
};
pub use packet::{Message, RequestBody, Response, SmppRequest, SmppResponse};
pub use processor::{DefaultPacketProcessor, PacketProcessor, ProcessorError, SessionListener};
pub use window::{Window, WindowError, WindowFuture};
