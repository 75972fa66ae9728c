//! SMPP session state machine.
//!
//! A session owns one client connection's protocol state. Inbound frames are
//! classified once ([`PduKind`]) and either complete a pending outbound request
//! or go through the bind-state check to the packet processor. Replies to the
//! processor's requests leave through a [`ResponseSender`], which lets exactly
//! one reply per request reach the wire.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::{FutureExt, StreamExt};
use tokio::io::AsyncRead;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec::{
    BindType, CommandId, Pdu, PduFrame, PduKind, SmppCodec, Status, Tlv, TAG_SC_INTERFACE_VERSION,
    VERSION_3_4,
};
use crate::config::SessionConfig;
use crate::error::{ChannelError, SmppError};
use crate::packet::{mapper, Response, SmppRequest, SmppResponse};
use crate::processor::PacketProcessor;
use crate::telemetry::counters;
use crate::window::{Window, WindowError};

use super::connection::Channel;

/// Numeric session identifier assigned by the server.
pub type SessionId = u32;

/// Outbound sequence numbers stay within 1..=MAX_SEQUENCE.
const MAX_SEQUENCE: u32 = 0x7FFF_FFFF;

/// How often the read loop reclaims expired window entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Connection established, awaiting bind
    Open,
    /// Bind accepted
    Bound,
    /// Connection closed; terminal
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Open => write!(f, "OPEN"),
            SessionStatus::Bound => write!(f, "BOUND"),
            SessionStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

#[derive(Debug)]
struct BindState {
    status: SessionStatus,
    bind_type: Option<BindType>,
    system_id: Option<String>,
}

struct SessionInner {
    id: SessionId,
    channel: Arc<dyn Channel>,
    codec: SmppCodec,
    state: RwLock<BindState>,
    processor: RwLock<Arc<dyn PacketProcessor>>,
    window: Arc<Window<PduFrame, PduFrame>>,
    sequence: AtomicU32,
    config: SessionConfig,
    /// system_id this server reports in bind responses
    server_system_id: String,
    created_at: DateTime<Utc>,
    started: Instant,
    shutdown: CancellationToken,
}

/// Handle to an SMPP session. Clones share the same session.
#[derive(Clone)]
pub struct SmppSession {
    inner: Arc<SessionInner>,
}

impl SmppSession {
    pub fn new(
        id: SessionId,
        channel: Arc<dyn Channel>,
        processor: Arc<dyn PacketProcessor>,
        config: SessionConfig,
        server_system_id: impl Into<String>,
    ) -> Self {
        let window = Window::new(config.window_size);
        Self {
            inner: Arc::new(SessionInner {
                id,
                channel,
                codec: SmppCodec::new(),
                state: RwLock::new(BindState {
                    status: SessionStatus::Open,
                    bind_type: None,
                    system_id: None,
                }),
                processor: RwLock::new(processor),
                window,
                sequence: AtomicU32::new(0),
                config,
                server_system_id: server_system_id.into(),
                created_at: Utc::now(),
                started: Instant::now(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn status(&self) -> SessionStatus {
        self.read_state().status
    }

    pub fn is_bound(&self) -> bool {
        self.status() == SessionStatus::Bound
    }

    /// The role the client bound as. Fails unless the session is bound.
    pub fn bind_type(&self) -> Result<BindType, SmppError> {
        let state = self.read_state();
        match (state.status, state.bind_type) {
            (SessionStatus::Bound, Some(bind_type)) => Ok(bind_type),
            _ => Err(SmppError::IllegalState("session is not bound".into())),
        }
    }

    /// The system_id the client bound with. Fails unless the session is bound.
    pub fn system_id(&self) -> Result<String, SmppError> {
        let state = self.read_state();
        match (state.status, &state.system_id) {
            (SessionStatus::Bound, Some(system_id)) => Ok(system_id.clone()),
            _ => Err(SmppError::IllegalState("session is not bound".into())),
        }
    }

    pub fn status_string(&self) -> String {
        self.status().to_string()
    }

    pub fn bind_type_string(&self) -> String {
        match self.bind_type() {
            Ok(bind_type) => bind_type.to_string(),
            Err(_) => "Session not bound".to_string(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Human readable session age, e.g. "about 5 minutes ago".
    pub fn created_ago(&self) -> String {
        format_age(Utc::now() - self.inner.created_at)
    }

    pub fn lifetime(&self) -> Duration {
        self.inner.started.elapsed()
    }

    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner.channel.peer_addr()
    }

    /// Outbound requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.window.size()
    }

    pub fn packet_processor(&self) -> Arc<dyn PacketProcessor> {
        self.inner
            .processor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the processor used for requests received from now on.
    pub fn set_packet_processor(&self, processor: Arc<dyn PacketProcessor>) {
        *self
            .inner
            .processor
            .write()
            .unwrap_or_else(PoisonError::into_inner) = processor;
    }

    pub fn downgrade(&self) -> WeakSession {
        WeakSession {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Drive the session from `reader` until the peer goes away, a frame
    /// fails to decode, or the session is disconnected.
    pub async fn run<R>(&self, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let id = self.id();
        let mut frames = FramedRead::new(reader, self.inner.codec);
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => {
                    debug!(session = id, "session disconnected");
                    break;
                }

                result = frames.next() => {
                    match result {
                        Some(Ok(frame)) => self.handle_frame(frame).await,
                        Some(Err(e)) => {
                            warn!(session = id, error = %e, "decode error, closing connection");
                            counters::pdu_error("decode");
                            break;
                        }
                        None => {
                            debug!(session = id, "connection closed by peer");
                            break;
                        }
                    }
                }

                _ = sweep.tick() => self.expire_pending(),
            }
        }

        if let Err(e) = self.disconnect().await {
            debug!(session = id, error = %e, "disconnect after read loop failed");
        }
    }

    /// Send a request to the client and wait up to `timeout` for its response.
    ///
    /// Only deliver_sm, enquire_link and unbind may be sent, and only while
    /// bound. A sequence number is assigned if the request has none. A
    /// caller-chosen sequence number that is still pending on this session,
    /// including one assigned automatically, fails with
    /// [`WindowError::DuplicateKey`]. A request that cannot be encoded fails
    /// with [`ChannelError::Encode`] and nothing is written. After an unbind
    /// the connection is closed whatever the response status.
    pub async fn send_request(
        &self,
        mut request: SmppRequest,
        timeout: Duration,
    ) -> Result<SmppResponse, SmppError> {
        if !self.is_bound() {
            return Err(SmppError::IllegalState("session is not bound".into()));
        }

        let command = request.command_id();
        if !matches!(
            command,
            CommandId::DeliverSm | CommandId::EnquireLink | CommandId::Unbind
        ) {
            return Err(SmppError::IllegalArgument(format!(
                "{} cannot be sent to the client, expected deliver_sm, enquire_link or unbind",
                command
            )));
        }

        let sequence = match request.sequence_number {
            Some(sequence) => sequence,
            None => {
                let sequence = self.next_sequence();
                request.sequence_number = Some(sequence);
                sequence
            }
        };
        let frame = mapper::to_frame(&request, sequence).ok_or_else(|| {
            SmppError::IllegalArgument(format!("{} has no wire representation", command))
        })?;

        let future = match self
            .inner
            .window
            .offer(
                sequence,
                frame.clone(),
                self.inner.config.offer_timeout,
                self.inner.config.expire_timeout,
            )
            .await
        {
            Ok(future) => {
                counters::window_offer("accepted");
                future
            }
            Err(e) => {
                warn!(session = self.id(), sequence, error = %e, "window offer failed");
                counters::window_offer("rejected");
                return Err(e.into());
            }
        };

        // Dropping `future` on a failed write cancels the window entry.
        if let Err(e) = self.write_frame(&frame).await {
            warn!(session = self.id(), sequence, command = %command, error = %e, "failed to send request");
            return Err(e.into());
        }

        let started = Instant::now();
        let response = match future.await_response(timeout).await {
            Ok(response) => response,
            Err(WindowError::Timeout(_)) => {
                warn!(session = self.id(), sequence, command = %command, ?timeout, "request timed out");
                counters::window_timeout(&command.to_string());
                return Err(SmppError::Timeout { sequence, timeout });
            }
            Err(e) => return Err(e.into()),
        };
        counters::request_duration(&command.to_string(), started.elapsed().as_secs_f64());

        if command == CommandId::Unbind {
            if let Err(e) = self.disconnect().await {
                warn!(session = self.id(), error = %e, "disconnect after unbind failed");
            }
        }

        Ok(mapper::to_response(&response))
    }

    /// Unbind (if bound) and close the connection.
    ///
    /// If the unbind gets no response within the configured unbind timeout the
    /// connection is closed anyway.
    pub async fn close(&self) -> Result<(), SmppError> {
        if !self.is_bound() {
            self.disconnect().await?;
            return Ok(());
        }

        let timeout = self.inner.config.unbind_timeout;
        if let Err(e) = self.send_request(SmppRequest::unbind(), timeout).await {
            warn!(session = self.id(), error = %e, "unbind failed, disconnecting");
            self.disconnect().await?;
        }
        Ok(())
    }

    /// Mark the session closed, release pending requests and close the link.
    pub async fn disconnect(&self) -> Result<(), ChannelError> {
        let previous = {
            let mut state = self.write_state();
            std::mem::replace(&mut state.status, SessionStatus::Closed)
        };

        if previous != SessionStatus::Closed {
            debug!(session = self.id(), from = %previous, "session closed");
            let released = self.inner.window.close();
            if released > 0 {
                debug!(session = self.id(), released, "released pending requests");
            }
        }

        self.inner.shutdown.cancel();
        self.inner.channel.disconnect().await
    }

    /// Handle one inbound frame.
    async fn handle_frame(&self, frame: PduFrame) {
        let id = self.id();
        trace!(
            session = id,
            command = %frame.command(),
            sequence = frame.sequence(),
            "pdu received"
        );
        counters::pdu_received(&frame.command().to_string());

        let status = self.status();
        if status == SessionStatus::Closed {
            warn!(session = id, command = %frame.command(), "frame received on closed session, dropping");
            if let Err(e) = self.disconnect().await {
                debug!(session = id, error = %e, "disconnect failed");
            }
            return;
        }

        match (frame.kind(), status) {
            (PduKind::Response, _) => self.handle_response(frame),
            (PduKind::Bind(_), SessionStatus::Bound) => {
                self.reject(&frame, Status::AlreadyBound).await
            }
            (PduKind::Request, SessionStatus::Open) => {
                self.reject(&frame, Status::InvalidBindStatus).await
            }
            _ => self.dispatch(frame).await,
        }
    }

    /// Answer a request that is not valid in the current bind state.
    async fn reject(&self, request: &PduFrame, status: Status) {
        debug!(
            session = self.id(),
            command = %request.command(),
            sequence = request.sequence(),
            status = %status,
            "rejecting request for bind state"
        );
        counters::state_rejection(&status.to_string());

        let response = PduFrame::response_for(request, status);
        if let Err(e) = self.write_frame(&response).await {
            error!(session = self.id(), error = %e, "failed to send response");
        }
    }

    /// Hand a request to the packet processor.
    async fn dispatch(&self, frame: PduFrame) {
        let id = self.id();
        let request = mapper::to_request(&frame);
        let command = frame.command();
        let responder = ResponseSender::new(self.clone(), frame);
        let processor = self.packet_processor();

        let outcome = AssertUnwindSafe(processor.process_packet(id, request, responder))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(session = id, command = %command, error = %e, "packet processor failed");
                counters::processor_error("error");
            }
            Err(_) => {
                error!(session = id, command = %command, "packet processor panicked");
                counters::processor_error("panic");
            }
        }
    }

    /// Write the reply to `request`. Called at most once per request.
    async fn respond(&self, request: &PduFrame, response: Response) {
        let id = self.id();
        let mut status = response.status;

        if let PduKind::Bind(bind_type) = request.kind() {
            if status.is_ok() {
                let system_id = bind_system_id(request);
                match self.mark_bound(bind_type, system_id.clone()) {
                    Ok(()) => {
                        info!(session = id, system_id = %system_id, bind_type = %bind_type, "session bound");
                        counters::bind(&bind_type.to_string(), "success");
                    }
                    Err(current) => {
                        warn!(session = id, status = %current, "bind accepted but session is no longer open");
                        if current == SessionStatus::Bound {
                            status = Status::AlreadyBound;
                        }
                    }
                }
            } else {
                info!(session = id, bind_type = %bind_type, status = %status, "bind rejected");
                counters::bind(&bind_type.to_string(), "rejected");
            }
        }

        let mut frame = PduFrame::response_for(request, status);
        match &mut frame.pdu {
            Pdu::BindTransmitterResp(resp)
            | Pdu::BindReceiverResp(resp)
            | Pdu::BindTransceiverResp(resp) => {
                resp.system_id = self.inner.server_system_id.clone();
                if status.is_ok() {
                    resp.tlvs
                        .insert(Tlv::new(TAG_SC_INTERFACE_VERSION, vec![VERSION_3_4]));
                }
            }
            Pdu::SubmitSmResp(resp) => {
                if let Some(message_id) = response.message_id {
                    resp.message_id = message_id;
                }
            }
            _ => {}
        }

        if let Err(e) = self.write_frame(&frame).await {
            error!(session = id, sequence = frame.sequence(), error = %e, "failed to send response");
        }

        if request.command() == CommandId::Unbind {
            info!(session = id, "unbind acknowledged, disconnecting");
            if let Err(e) = self.disconnect().await {
                warn!(session = id, error = %e, "disconnect after unbind failed");
            }
        }
    }

    /// Complete the pending request matching a response frame.
    fn handle_response(&self, frame: PduFrame) {
        let sequence = frame.sequence();
        let command = frame.command();

        match self.inner.window.complete(sequence, frame) {
            Some((request, waited)) => {
                trace!(
                    session = self.id(),
                    sequence,
                    request = %request.command(),
                    latency_ms = waited.as_millis() as u64,
                    "response received"
                );
            }
            None => {
                debug!(session = self.id(), sequence, command = %command, "no pending request for response, dropping");
                counters::window_unmatched();
            }
        }
    }

    /// Reclaim window entries that outlived their expiry deadline.
    fn expire_pending(&self) {
        let expired = self.inner.window.expire();
        if expired.is_empty() {
            return;
        }

        for (sequence, request) in &expired {
            warn!(
                session = self.id(),
                sequence = *sequence,
                command = %request.command(),
                "pending request expired"
            );
        }
        counters::window_expired(expired.len());
    }

    /// Encode and write one frame. Every outbound PDU goes through here.
    async fn write_frame(&self, frame: &PduFrame) -> Result<(), ChannelError> {
        let bytes = self.inner.codec.encode_frame(frame).map_err(|e| {
            counters::pdu_error("encode");
            ChannelError::from(e)
        })?;

        if let Err(e) = self.inner.channel.write(bytes).await {
            counters::pdu_error("write");
            return Err(e);
        }

        trace!(
            session = self.id(),
            command = %frame.command(),
            sequence = frame.sequence(),
            status = %frame.status(),
            "pdu sent"
        );
        counters::pdu_sent(&frame.command().to_string());
        Ok(())
    }

    /// Next outbound sequence number; after MAX_SEQUENCE it wraps to 1.
    fn next_sequence(&self) -> u32 {
        let following = |last: u32| if last >= MAX_SEQUENCE { 1 } else { last + 1 };
        let last = match self
            .inner
            .sequence
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| Some(following(last)))
        {
            Ok(last) | Err(last) => last,
        };
        following(last)
    }

    /// OPEN -> BOUND. Returns the current status if the session is not open.
    fn mark_bound(&self, bind_type: BindType, system_id: String) -> Result<(), SessionStatus> {
        let mut state = self.write_state();
        if state.status != SessionStatus::Open {
            return Err(state.status);
        }
        state.status = SessionStatus::Bound;
        state.bind_type = Some(bind_type);
        state.system_id = Some(system_id);
        Ok(())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, BindState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, BindState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SmppSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmppSession")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .field("peer_addr", &self.peer_addr())
            .finish()
    }
}

/// Non-owning session handle.
#[derive(Clone)]
pub struct WeakSession {
    inner: Weak<SessionInner>,
}

impl WeakSession {
    pub fn upgrade(&self) -> Option<SmppSession> {
        self.inner.upgrade().map(|inner| SmppSession { inner })
    }
}

/// Sends the reply to one inbound request.
///
/// Clones share a single "sent" flag: the first [`send`](Self::send) across
/// all clones writes the reply, later calls are logged and ignored.
#[derive(Clone)]
pub struct ResponseSender {
    session: SmppSession,
    request: Arc<PduFrame>,
    sent: Arc<AtomicBool>,
}

impl ResponseSender {
    fn new(session: SmppSession, request: PduFrame) -> Self {
        Self {
            session,
            request: Arc::new(request),
            sent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send `response` to the client. Returns `false` if a reply was already
    /// sent for this request.
    pub async fn send(&self, response: Response) -> bool {
        if self
            .sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(
                session = self.session.id(),
                sequence = self.request.sequence(),
                command = %self.request.command(),
                "response already sent, ignoring"
            );
            counters::duplicate_response();
            return false;
        }

        self.session.respond(&self.request, response).await;
        true
    }

    pub fn is_sent(&self) -> bool {
        self.sent.load(Ordering::Acquire)
    }

    pub fn sequence_number(&self) -> u32 {
        self.request.sequence()
    }

    pub fn command_id(&self) -> CommandId {
        self.request.command()
    }
}

impl fmt::Debug for ResponseSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSender")
            .field("session", &self.session.id())
            .field("sequence", &self.request.sequence())
            .field("sent", &self.is_sent())
            .finish()
    }
}

fn bind_system_id(request: &PduFrame) -> String {
    match &request.pdu {
        Pdu::BindTransmitter(bind) | Pdu::BindReceiver(bind) | Pdu::BindTransceiver(bind) => {
            bind.system_id.clone()
        }
        _ => String::new(),
    }
}

/// Format an age as "just now", "about N minutes ago", "about N hours ago" or
/// "N days ago".
pub(crate) fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);

    if secs < 60 {
        return "just now".to_string();
    }
    if secs < 3_600 {
        let minutes = secs / 60;
        return format!("about {} {} ago", minutes, plural(minutes, "minute"));
    }
    if secs < 86_400 {
        let hours = secs / 3_600;
        return format!("about {} {} ago", hours, plural(hours, "hour"));
    }
    let days = secs / 86_400;
    format!("{} {} ago", days, plural(days, "day"))
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        unit.to_string()
    } else {
        format!("{}s", unit)
    }
}
