//! Extension points: packet processing and session lifecycle hooks.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::listener::{ResponseSender, SmppSession};
use crate::packet::{RequestBody, Response, SmppRequest};

/// Failure reported by a packet processor.
///
/// The session logs it and sends no reply for the request.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("packet rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Decides how to answer the requests a client sends.
///
/// Implementations reply through `responder`; only the first reply reaches the
/// client. Returning without replying (or with an error) leaves the request
/// unanswered.
///
/// The processor runs on the connection's read task. A processor that wants
/// to call [`SmppSession::send_request`] on the same session must spawn,
/// since the response is read by that same task.
#[async_trait]
pub trait PacketProcessor: Send + Sync {
    async fn process_packet(
        &self,
        session_id: u32,
        request: SmppRequest,
        responder: ResponseSender,
    ) -> Result<(), ProcessorError>;
}

/// Hooks fired when the server creates or destroys a session.
pub trait SessionListener: Send + Sync {
    fn created(&self, session: &SmppSession);

    fn destroyed(&self, session: &SmppSession);
}

/// Processor used when none is configured: accepts everything.
///
/// submit_sm requests are given a sequential hexadecimal message id.
#[derive(Debug, Default)]
pub struct DefaultPacketProcessor {
    next_message_id: AtomicU64,
}

impl DefaultPacketProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn message_id(&self) -> String {
        format!("{:08x}", self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl PacketProcessor for DefaultPacketProcessor {
    async fn process_packet(
        &self,
        session_id: u32,
        request: SmppRequest,
        responder: ResponseSender,
    ) -> Result<(), ProcessorError> {
        let response = match &request.body {
            RequestBody::SubmitSm(_) => Response::accepted(self.message_id()),
            _ => Response::ok(),
        };
        debug!(
            session = session_id,
            command = %request.command_id(),
            "accepting request"
        );
        responder.send(response).await;
        Ok(())
    }
}
