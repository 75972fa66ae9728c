//! Command identifiers and command status codes.

use std::fmt;

/// SMPP v3.4 command identifiers.
///
/// Bit 31 of the raw value marks a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    GenericNack,
    BindReceiver,
    BindReceiverResp,
    BindTransmitter,
    BindTransmitterResp,
    SubmitSm,
    SubmitSmResp,
    DeliverSm,
    DeliverSmResp,
    Unbind,
    UnbindResp,
    BindTransceiver,
    BindTransceiverResp,
    EnquireLink,
    EnquireLinkResp,
    /// Any command this codec does not model.
    Other(u32),
}

const RESPONSE_BIT: u32 = 0x8000_0000;

impl CommandId {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x8000_0000 => Self::GenericNack,
            0x0000_0001 => Self::BindReceiver,
            0x8000_0001 => Self::BindReceiverResp,
            0x0000_0002 => Self::BindTransmitter,
            0x8000_0002 => Self::BindTransmitterResp,
            0x0000_0004 => Self::SubmitSm,
            0x8000_0004 => Self::SubmitSmResp,
            0x0000_0005 => Self::DeliverSm,
            0x8000_0005 => Self::DeliverSmResp,
            0x0000_0006 => Self::Unbind,
            0x8000_0006 => Self::UnbindResp,
            0x0000_0009 => Self::BindTransceiver,
            0x8000_0009 => Self::BindTransceiverResp,
            0x0000_0015 => Self::EnquireLink,
            0x8000_0015 => Self::EnquireLinkResp,
            other => Self::Other(other),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::GenericNack => 0x8000_0000,
            Self::BindReceiver => 0x0000_0001,
            Self::BindReceiverResp => 0x8000_0001,
            Self::BindTransmitter => 0x0000_0002,
            Self::BindTransmitterResp => 0x8000_0002,
            Self::SubmitSm => 0x0000_0004,
            Self::SubmitSmResp => 0x8000_0004,
            Self::DeliverSm => 0x0000_0005,
            Self::DeliverSmResp => 0x8000_0005,
            Self::Unbind => 0x0000_0006,
            Self::UnbindResp => 0x8000_0006,
            Self::BindTransceiver => 0x0000_0009,
            Self::BindTransceiverResp => 0x8000_0009,
            Self::EnquireLink => 0x0000_0015,
            Self::EnquireLinkResp => 0x8000_0015,
            Self::Other(value) => *value,
        }
    }

    /// Check if this command is a response.
    pub fn is_response(&self) -> bool {
        self.as_u32() & RESPONSE_BIT != 0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GenericNack => write!(f, "generic_nack"),
            Self::BindReceiver => write!(f, "bind_receiver"),
            Self::BindReceiverResp => write!(f, "bind_receiver_resp"),
            Self::BindTransmitter => write!(f, "bind_transmitter"),
            Self::BindTransmitterResp => write!(f, "bind_transmitter_resp"),
            Self::SubmitSm => write!(f, "submit_sm"),
            Self::SubmitSmResp => write!(f, "submit_sm_resp"),
            Self::DeliverSm => write!(f, "deliver_sm"),
            Self::DeliverSmResp => write!(f, "deliver_sm_resp"),
            Self::Unbind => write!(f, "unbind"),
            Self::UnbindResp => write!(f, "unbind_resp"),
            Self::BindTransceiver => write!(f, "bind_transceiver"),
            Self::BindTransceiverResp => write!(f, "bind_transceiver_resp"),
            Self::EnquireLink => write!(f, "enquire_link"),
            Self::EnquireLinkResp => write!(f, "enquire_link_resp"),
            Self::Other(value) => write!(f, "{:#010x}", value),
        }
    }
}

/// SMPP command status (`command_status` header field).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    Ok,
    InvalidMsgLength,
    InvalidCommandLength,
    InvalidCommandId,
    InvalidBindStatus,
    AlreadyBound,
    SystemError,
    BindFailed,
    InvalidPassword,
    InvalidSystemId,
    MessageQueueFull,
    Throttled,
    /// Raw status without a named variant.
    Other(u32),
}

impl Status {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x0000_0000 => Self::Ok,
            0x0000_0001 => Self::InvalidMsgLength,
            0x0000_0002 => Self::InvalidCommandLength,
            0x0000_0003 => Self::InvalidCommandId,
            0x0000_0004 => Self::InvalidBindStatus,
            0x0000_0005 => Self::AlreadyBound,
            0x0000_0008 => Self::SystemError,
            0x0000_000D => Self::BindFailed,
            0x0000_000E => Self::InvalidPassword,
            0x0000_000F => Self::InvalidSystemId,
            0x0000_0014 => Self::MessageQueueFull,
            0x0000_0058 => Self::Throttled,
            other => Self::Other(other),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Ok => 0x0000_0000,
            Self::InvalidMsgLength => 0x0000_0001,
            Self::InvalidCommandLength => 0x0000_0002,
            Self::InvalidCommandId => 0x0000_0003,
            Self::InvalidBindStatus => 0x0000_0004,
            Self::AlreadyBound => 0x0000_0005,
            Self::SystemError => 0x0000_0008,
            Self::BindFailed => 0x0000_000D,
            Self::InvalidPassword => 0x0000_000E,
            Self::InvalidSystemId => 0x0000_000F,
            Self::MessageQueueFull => 0x0000_0014,
            Self::Throttled => 0x0000_0058,
            Self::Other(value) => *value,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ESME_ROK"),
            Self::InvalidMsgLength => write!(f, "ESME_RINVMSGLEN"),
            Self::InvalidCommandLength => write!(f, "ESME_RINVCMDLEN"),
            Self::InvalidCommandId => write!(f, "ESME_RINVCMDID"),
            Self::InvalidBindStatus => write!(f, "ESME_RINVBNDSTS"),
            Self::AlreadyBound => write!(f, "ESME_RALYBND"),
            Self::SystemError => write!(f, "ESME_RSYSERR"),
            Self::BindFailed => write!(f, "ESME_RBINDFAIL"),
            Self::InvalidPassword => write!(f, "ESME_RINVPASWD"),
            Self::InvalidSystemId => write!(f, "ESME_RINVSYSID"),
            Self::MessageQueueFull => write!(f, "ESME_RMSGQFUL"),
            Self::Throttled => write!(f, "ESME_RTHROTTLED"),
            Self::Other(value) => write!(f, "{:#010x}", value),
        }
    }
}
