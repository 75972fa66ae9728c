//! Listener module: accepting connections and running SMPP sessions.
//!
//! - The server binds the endpoint and owns the session registry
//! - The acceptor hands each connection to the server
//! - Each connection runs one session on its own task

mod acceptor;
pub(crate) mod connection;
mod registry;
mod server;
mod session;

pub use connection::{Channel, ConnectionId, TcpChannel};
pub use registry::SessionRegistry;
pub use server::{ServerStatus, SmppServer, WeakServer};
pub use session::{ResponseSender, SessionId, SessionStatus, SmppSession, WeakSession};
