//! PDU model.
//!
//! `Pdu` is a closed set of the commands the server engine classifies; every
//! other command is carried through as `Pdu::Other` with its raw body.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::command::{CommandId, Status};
use super::tlv::TlvMap;
use super::CodecError;

/// Maximum lengths (including the NUL terminator) of C-octet string fields.
const SYSTEM_ID_MAX: usize = 16;
const PASSWORD_MAX: usize = 9;
const SYSTEM_TYPE_MAX: usize = 13;
const ADDRESS_RANGE_MAX: usize = 41;
const SERVICE_TYPE_MAX: usize = 6;
const ADDR_MAX: usize = 21;
const TIME_MAX: usize = 17;
const MESSAGE_ID_MAX: usize = 65;

/// Role requested by a bind PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindType {
    Transmitter,
    Receiver,
    Transceiver,
}

impl fmt::Display for BindType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindType::Transmitter => write!(f, "TRANSMITTER"),
            BindType::Receiver => write!(f, "RECEIVER"),
            BindType::Transceiver => write!(f, "TRANSCEIVER"),
        }
    }
}

/// SME address: type of number, numbering plan and the address digits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub ton: u8,
    pub npi: u8,
    pub address: String,
}

impl Address {
    pub fn new(ton: u8, npi: u8, address: impl Into<String>) -> Self {
        Self {
            ton,
            npi,
            address: address.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.ton, self.npi, self.address)
    }
}

/// Body shared by bind_transmitter, bind_receiver and bind_transceiver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bind {
    pub system_id: String,
    pub password: String,
    pub system_type: String,
    pub interface_version: u8,
    pub addr_ton: u8,
    pub addr_npi: u8,
    pub address_range: String,
}

/// Body shared by the three bind responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindResp {
    pub system_id: String,
    pub tlvs: TlvMap,
}

/// Body shared by submit_sm and deliver_sm.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortMessage {
    pub service_type: String,
    pub source: Address,
    pub destination: Address,
    pub esm_class: u8,
    pub protocol_id: u8,
    pub priority_flag: u8,
    pub schedule_delivery_time: String,
    pub validity_period: String,
    pub registered_delivery: u8,
    pub replace_if_present: u8,
    pub data_coding: u8,
    pub sm_default_msg_id: u8,
    pub short_message: Bytes,
    pub tlvs: TlvMap,
}

/// Body shared by submit_sm_resp and deliver_sm_resp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageResp {
    pub message_id: String,
    pub tlvs: TlvMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    BindTransmitter(Bind),
    BindTransmitterResp(BindResp),
    BindReceiver(Bind),
    BindReceiverResp(BindResp),
    BindTransceiver(Bind),
    BindTransceiverResp(BindResp),
    SubmitSm(Box<ShortMessage>),
    SubmitSmResp(MessageResp),
    DeliverSm(Box<ShortMessage>),
    DeliverSmResp(MessageResp),
    EnquireLink,
    EnquireLinkResp,
    Unbind,
    UnbindResp,
    GenericNack,
    Other { command_id: u32, body: Bytes },
}

impl Pdu {
    pub fn command_id(&self) -> CommandId {
        match self {
            Pdu::BindTransmitter(_) => CommandId::BindTransmitter,
            Pdu::BindTransmitterResp(_) => CommandId::BindTransmitterResp,
            Pdu::BindReceiver(_) => CommandId::BindReceiver,
            Pdu::BindReceiverResp(_) => CommandId::BindReceiverResp,
            Pdu::BindTransceiver(_) => CommandId::BindTransceiver,
            Pdu::BindTransceiverResp(_) => CommandId::BindTransceiverResp,
            Pdu::SubmitSm(_) => CommandId::SubmitSm,
            Pdu::SubmitSmResp(_) => CommandId::SubmitSmResp,
            Pdu::DeliverSm(_) => CommandId::DeliverSm,
            Pdu::DeliverSmResp(_) => CommandId::DeliverSmResp,
            Pdu::EnquireLink => CommandId::EnquireLink,
            Pdu::EnquireLinkResp => CommandId::EnquireLinkResp,
            Pdu::Unbind => CommandId::Unbind,
            Pdu::UnbindResp => CommandId::UnbindResp,
            Pdu::GenericNack => CommandId::GenericNack,
            Pdu::Other { command_id, .. } => CommandId::from_u32(*command_id),
        }
    }

    /// Decode a PDU body for the given command.
    pub(crate) fn decode_body(command: CommandId, mut body: Bytes) -> Result<Self, CodecError> {
        let pdu = match command {
            CommandId::BindTransmitter => Pdu::BindTransmitter(decode_bind(&mut body)?),
            CommandId::BindReceiver => Pdu::BindReceiver(decode_bind(&mut body)?),
            CommandId::BindTransceiver => Pdu::BindTransceiver(decode_bind(&mut body)?),
            CommandId::BindTransmitterResp => Pdu::BindTransmitterResp(decode_bind_resp(&mut body)?),
            CommandId::BindReceiverResp => Pdu::BindReceiverResp(decode_bind_resp(&mut body)?),
            CommandId::BindTransceiverResp => Pdu::BindTransceiverResp(decode_bind_resp(&mut body)?),
            CommandId::SubmitSm => Pdu::SubmitSm(Box::new(decode_short_message(&mut body)?)),
            CommandId::DeliverSm => Pdu::DeliverSm(Box::new(decode_short_message(&mut body)?)),
            CommandId::SubmitSmResp => Pdu::SubmitSmResp(decode_message_resp(&mut body)?),
            CommandId::DeliverSmResp => Pdu::DeliverSmResp(decode_message_resp(&mut body)?),
            CommandId::EnquireLink => Pdu::EnquireLink,
            CommandId::EnquireLinkResp => Pdu::EnquireLinkResp,
            CommandId::Unbind => Pdu::Unbind,
            CommandId::UnbindResp => Pdu::UnbindResp,
            CommandId::GenericNack => Pdu::GenericNack,
            CommandId::Other(command_id) => {
                return Ok(Pdu::Other { command_id, body });
            }
        };
        Ok(pdu)
    }

    /// Encode the PDU body (everything after the header).
    ///
    /// Fields that do not fit their SMPP size limit are an error; nothing is
    /// clipped.
    pub(crate) fn encode_body(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        match self {
            Pdu::BindTransmitter(bind) | Pdu::BindReceiver(bind) | Pdu::BindTransceiver(bind) => {
                put_cstring(buf, &bind.system_id, SYSTEM_ID_MAX, "system_id")?;
                put_cstring(buf, &bind.password, PASSWORD_MAX, "password")?;
                put_cstring(buf, &bind.system_type, SYSTEM_TYPE_MAX, "system_type")?;
                buf.put_u8(bind.interface_version);
                buf.put_u8(bind.addr_ton);
                buf.put_u8(bind.addr_npi);
                put_cstring(buf, &bind.address_range, ADDRESS_RANGE_MAX, "address_range")?;
            }
            Pdu::BindTransmitterResp(resp)
            | Pdu::BindReceiverResp(resp)
            | Pdu::BindTransceiverResp(resp) => {
                put_cstring(buf, &resp.system_id, SYSTEM_ID_MAX, "system_id")?;
                resp.tlvs.encode(buf)?;
            }
            Pdu::SubmitSm(sm) | Pdu::DeliverSm(sm) => {
                put_cstring(buf, &sm.service_type, SERVICE_TYPE_MAX, "service_type")?;
                put_address(buf, &sm.source, "source_addr")?;
                put_address(buf, &sm.destination, "destination_addr")?;
                buf.put_u8(sm.esm_class);
                buf.put_u8(sm.protocol_id);
                buf.put_u8(sm.priority_flag);
                put_cstring(buf, &sm.schedule_delivery_time, TIME_MAX, "schedule_delivery_time")?;
                put_cstring(buf, &sm.validity_period, TIME_MAX, "validity_period")?;
                buf.put_u8(sm.registered_delivery);
                buf.put_u8(sm.replace_if_present);
                buf.put_u8(sm.data_coding);
                buf.put_u8(sm.sm_default_msg_id);
                let len = u8::try_from(sm.short_message.len()).map_err(|_| {
                    CodecError::FieldTooLong {
                        field: "short_message",
                        max: u8::MAX as usize,
                    }
                })?;
                buf.put_u8(len);
                buf.put_slice(&sm.short_message);
                sm.tlvs.encode(buf)?;
            }
            Pdu::SubmitSmResp(resp) | Pdu::DeliverSmResp(resp) => {
                put_cstring(buf, &resp.message_id, MESSAGE_ID_MAX, "message_id")?;
                resp.tlvs.encode(buf)?;
            }
            Pdu::EnquireLink
            | Pdu::EnquireLinkResp
            | Pdu::Unbind
            | Pdu::UnbindResp
            | Pdu::GenericNack => {}
            Pdu::Other { body, .. } => buf.put_slice(body),
        }
        Ok(())
    }
}

/// PDU header without the length, which the codec derives on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub command: CommandId,
    pub status: Status,
    pub sequence: u32,
}

/// Classification of an inbound frame, computed once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    /// Any response, including generic_nack.
    Response,
    /// One of the three bind requests.
    Bind(BindType),
    /// Any other request.
    Request,
}

/// A decoded PDU together with its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduFrame {
    pub header: Header,
    pub pdu: Pdu,
}

impl PduFrame {
    /// Build a frame whose command id follows the PDU.
    pub fn new(sequence: u32, status: Status, pdu: Pdu) -> Self {
        Self {
            header: Header {
                command: pdu.command_id(),
                status,
                sequence,
            },
            pdu,
        }
    }

    /// Build a request frame (status is always OK for requests).
    pub fn request(sequence: u32, pdu: Pdu) -> Self {
        Self::new(sequence, Status::Ok, pdu)
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    pub fn command(&self) -> CommandId {
        self.header.command
    }

    pub fn status(&self) -> Status {
        self.header.status
    }

    pub fn is_response(&self) -> bool {
        self.header.command.is_response()
    }

    pub fn kind(&self) -> PduKind {
        if self.is_response() {
            return PduKind::Response;
        }
        match self.pdu {
            Pdu::BindTransmitter(_) => PduKind::Bind(BindType::Transmitter),
            Pdu::BindReceiver(_) => PduKind::Bind(BindType::Receiver),
            Pdu::BindTransceiver(_) => PduKind::Bind(BindType::Transceiver),
            _ => PduKind::Request,
        }
    }

    /// Build the response matching `request` with the given status.
    ///
    /// Requests without a response counterpart are answered with generic_nack.
    pub fn response_for(request: &PduFrame, status: Status) -> PduFrame {
        let pdu = match &request.pdu {
            Pdu::BindTransmitter(_) => Pdu::BindTransmitterResp(BindResp::default()),
            Pdu::BindReceiver(_) => Pdu::BindReceiverResp(BindResp::default()),
            Pdu::BindTransceiver(_) => Pdu::BindTransceiverResp(BindResp::default()),
            Pdu::SubmitSm(_) => Pdu::SubmitSmResp(MessageResp::default()),
            Pdu::DeliverSm(_) => Pdu::DeliverSmResp(MessageResp::default()),
            Pdu::EnquireLink => Pdu::EnquireLinkResp,
            Pdu::Unbind => Pdu::UnbindResp,
            _ => Pdu::GenericNack,
        };
        PduFrame::new(request.sequence(), status, pdu)
    }
}

fn decode_bind(body: &mut Bytes) -> Result<Bind, CodecError> {
    Ok(Bind {
        system_id: get_cstring(body, SYSTEM_ID_MAX, "system_id")?,
        password: get_cstring(body, PASSWORD_MAX, "password")?,
        system_type: get_cstring(body, SYSTEM_TYPE_MAX, "system_type")?,
        interface_version: get_u8(body, "interface_version")?,
        addr_ton: get_u8(body, "addr_ton")?,
        addr_npi: get_u8(body, "addr_npi")?,
        address_range: get_cstring(body, ADDRESS_RANGE_MAX, "address_range")?,
    })
}

fn decode_bind_resp(body: &mut Bytes) -> Result<BindResp, CodecError> {
    // Error responses may omit the body entirely.
    if !body.has_remaining() {
        return Ok(BindResp::default());
    }
    let system_id = get_cstring(body, SYSTEM_ID_MAX, "system_id")?;
    let tlvs = TlvMap::decode(body)?;
    Ok(BindResp { system_id, tlvs })
}

fn decode_short_message(body: &mut Bytes) -> Result<ShortMessage, CodecError> {
    let service_type = get_cstring(body, SERVICE_TYPE_MAX, "service_type")?;
    let source = get_address(body, "source_addr")?;
    let destination = get_address(body, "destination_addr")?;
    let esm_class = get_u8(body, "esm_class")?;
    let protocol_id = get_u8(body, "protocol_id")?;
    let priority_flag = get_u8(body, "priority_flag")?;
    let schedule_delivery_time = get_cstring(body, TIME_MAX, "schedule_delivery_time")?;
    let validity_period = get_cstring(body, TIME_MAX, "validity_period")?;
    let registered_delivery = get_u8(body, "registered_delivery")?;
    let replace_if_present = get_u8(body, "replace_if_present_flag")?;
    let data_coding = get_u8(body, "data_coding")?;
    let sm_default_msg_id = get_u8(body, "sm_default_msg_id")?;
    let sm_length = get_u8(body, "sm_length")? as usize;
    if body.remaining() < sm_length {
        return Err(CodecError::Truncated("short_message"));
    }
    let short_message = body.split_to(sm_length);
    let tlvs = TlvMap::decode(body)?;

    Ok(ShortMessage {
        service_type,
        source,
        destination,
        esm_class,
        protocol_id,
        priority_flag,
        schedule_delivery_time,
        validity_period,
        registered_delivery,
        replace_if_present,
        data_coding,
        sm_default_msg_id,
        short_message,
        tlvs,
    })
}

fn decode_message_resp(body: &mut Bytes) -> Result<MessageResp, CodecError> {
    if !body.has_remaining() {
        return Ok(MessageResp::default());
    }
    let message_id = get_cstring(body, MESSAGE_ID_MAX, "message_id")?;
    let tlvs = TlvMap::decode(body)?;
    Ok(MessageResp { message_id, tlvs })
}

fn get_u8(body: &mut Bytes, field: &'static str) -> Result<u8, CodecError> {
    if !body.has_remaining() {
        return Err(CodecError::Truncated(field));
    }
    Ok(body.get_u8())
}

fn get_address(body: &mut Bytes, field: &'static str) -> Result<Address, CodecError> {
    let ton = get_u8(body, field)?;
    let npi = get_u8(body, field)?;
    let address = get_cstring(body, ADDR_MAX, field)?;
    Ok(Address { ton, npi, address })
}

/// Read a NUL-terminated string of at most `max` bytes including the NUL.
fn get_cstring(body: &mut Bytes, max: usize, field: &'static str) -> Result<String, CodecError> {
    let nul = match body.iter().position(|&b| b == 0) {
        Some(pos) => pos,
        None => return Err(CodecError::Truncated(field)),
    };
    if nul + 1 > max {
        return Err(CodecError::FieldTooLong { field, max });
    }
    let raw = body.split_to(nul);
    body.advance(1);
    String::from_utf8(raw.to_vec()).map_err(|source| CodecError::Utf8 { field, source })
}

/// Write `value` NUL-terminated. `max` includes the NUL.
fn put_cstring(
    buf: &mut BytesMut,
    value: &str,
    max: usize,
    field: &'static str,
) -> Result<(), CodecError> {
    let bytes = value.as_bytes();
    if bytes.len() + 1 > max {
        return Err(CodecError::FieldTooLong { field, max });
    }
    buf.put_slice(bytes);
    buf.put_u8(0);
    Ok(())
}

fn put_address(buf: &mut BytesMut, address: &Address, field: &'static str) -> Result<(), CodecError> {
    buf.put_u8(address.ton);
    buf.put_u8(address.npi);
    put_cstring(buf, &address.address, ADDR_MAX, field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let bind = PduFrame::request(1, Pdu::BindReceiver(Bind::default()));
        assert_eq!(bind.kind(), PduKind::Bind(BindType::Receiver));

        let submit = PduFrame::request(2, Pdu::SubmitSm(Box::default()));
        assert_eq!(submit.kind(), PduKind::Request);

        let nack = PduFrame::new(3, Status::InvalidCommandId, Pdu::GenericNack);
        assert_eq!(nack.kind(), PduKind::Response);

        let resp = PduFrame::new(4, Status::Ok, Pdu::DeliverSmResp(MessageResp::default()));
        assert_eq!(resp.kind(), PduKind::Response);
    }

    #[test]
    fn test_response_for_keeps_sequence() {
        let req = PduFrame::request(77, Pdu::Unbind);
        let resp = PduFrame::response_for(&req, Status::Ok);
        assert_eq!(resp.sequence(), 77);
        assert_eq!(resp.command(), CommandId::UnbindResp);

        let outbind = PduFrame::request(78, Pdu::Other { command_id: 0x0B, body: Bytes::new() });
        let resp = PduFrame::response_for(&outbind, Status::InvalidBindStatus);
        assert_eq!(resp.command(), CommandId::GenericNack);
        assert_eq!(resp.status(), Status::InvalidBindStatus);
    }

    #[test]
    fn test_cstring_too_long() {
        let mut body = Bytes::from_static(b"abcdefghijklmnopq\0");
        let err = get_cstring(&mut body, SYSTEM_ID_MAX, "system_id").unwrap_err();
        assert!(matches!(err, CodecError::FieldTooLong { field: "system_id", .. }));
    }

    #[test]
    fn test_oversized_short_message_is_rejected() {
        let pdu = Pdu::DeliverSm(Box::new(ShortMessage {
            short_message: Bytes::from(vec![b'a'; 300]),
            ..Default::default()
        }));
        let mut buf = BytesMut::new();
        let err = pdu.encode_body(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::FieldTooLong { field: "short_message", max: 255 }));

        let pdu = Pdu::DeliverSm(Box::new(ShortMessage {
            short_message: Bytes::from(vec![b'a'; 255]),
            ..Default::default()
        }));
        assert!(pdu.encode_body(&mut BytesMut::new()).is_ok());
    }

    #[test]
    fn test_oversized_message_id_is_rejected() {
        let pdu = Pdu::SubmitSmResp(MessageResp {
            message_id: "X".repeat(100),
            ..Default::default()
        });
        let err = pdu.encode_body(&mut BytesMut::new()).unwrap_err();
        assert!(matches!(err, CodecError::FieldTooLong { field: "message_id", max: 65 }));
    }
}
