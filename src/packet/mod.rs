//! Simplified request/response values handed to packet processors.
//!
//! Processors never see wire PDUs; the [`mapper`] converts between the two.

pub mod mapper;

use bytes::Bytes;

use crate::codec::TlvMap;

pub use crate::codec::{Address, BindType, CommandId, Status};

/// A bind request as seen by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub bind_type: BindType,
    pub system_id: String,
    pub password: String,
    pub system_type: String,
    pub address_range: String,
}

/// A short message travelling in either direction (submit_sm or deliver_sm).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub source: Address,
    pub destination: Address,
    pub esm_class: u8,
    pub registered_delivery: u8,
    pub data_coding: u8,
    pub short_message: Bytes,
    pub tlvs: TlvMap,
}

impl Message {
    pub fn new(source: Address, destination: Address, text: impl Into<Bytes>) -> Self {
        Self {
            source,
            destination,
            short_message: text.into(),
            ..Default::default()
        }
    }

    pub fn with_esm_class(mut self, esm_class: u8) -> Self {
        self.esm_class = esm_class;
        self
    }

    pub fn with_registered_delivery(mut self, registered_delivery: u8) -> Self {
        self.registered_delivery = registered_delivery;
        self
    }

    pub fn with_data_coding(mut self, data_coding: u8) -> Self {
        self.data_coding = data_coding;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Bind(BindRequest),
    SubmitSm(Message),
    DeliverSm(Message),
    EnquireLink,
    Unbind,
    /// A request the mapper does not model; only its command is kept.
    Other(CommandId),
}

/// A request packet.
///
/// Outbound requests may leave `sequence_number` unset; the session assigns
/// the next one from its own counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmppRequest {
    pub sequence_number: Option<u32>,
    pub body: RequestBody,
}

impl SmppRequest {
    pub fn new(body: RequestBody) -> Self {
        Self {
            sequence_number: None,
            body,
        }
    }

    pub fn deliver_sm(message: Message) -> Self {
        Self::new(RequestBody::DeliverSm(message))
    }

    pub fn enquire_link() -> Self {
        Self::new(RequestBody::EnquireLink)
    }

    pub fn unbind() -> Self {
        Self::new(RequestBody::Unbind)
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence_number = Some(sequence);
        self
    }

    pub fn command_id(&self) -> CommandId {
        match &self.body {
            RequestBody::Bind(bind) => match bind.bind_type {
                BindType::Transmitter => CommandId::BindTransmitter,
                BindType::Receiver => CommandId::BindReceiver,
                BindType::Transceiver => CommandId::BindTransceiver,
            },
            RequestBody::SubmitSm(_) => CommandId::SubmitSm,
            RequestBody::DeliverSm(_) => CommandId::DeliverSm,
            RequestBody::EnquireLink => CommandId::EnquireLink,
            RequestBody::Unbind => CommandId::Unbind,
            RequestBody::Other(command) => *command,
        }
    }
}

/// The answer a processor gives to an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    /// Message id assigned to a submit_sm; ignored for other commands.
    pub message_id: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_status(status: Status) -> Self {
        Self {
            status,
            message_id: None,
        }
    }

    /// OK response carrying the message id assigned to a submit_sm.
    pub fn accepted(message_id: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message_id: Some(message_id.into()),
        }
    }
}

/// A response received from the client for a request the server sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmppResponse {
    pub command_id: CommandId,
    pub sequence_number: u32,
    pub status: Status,
    pub message_id: Option<String>,
}

impl SmppResponse {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}
