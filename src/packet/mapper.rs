//! Conversions between wire PDUs and packet values.

use crate::codec::{Bind, Pdu, PduFrame, ShortMessage, VERSION_3_4};

use super::{BindRequest, BindType, Message, RequestBody, SmppRequest, SmppResponse};

/// Map an inbound request frame to the value handed to the processor.
pub fn to_request(frame: &PduFrame) -> SmppRequest {
    let body = match &frame.pdu {
        Pdu::BindTransmitter(bind) => RequestBody::Bind(bind_request(BindType::Transmitter, bind)),
        Pdu::BindReceiver(bind) => RequestBody::Bind(bind_request(BindType::Receiver, bind)),
        Pdu::BindTransceiver(bind) => RequestBody::Bind(bind_request(BindType::Transceiver, bind)),
        Pdu::SubmitSm(sm) => RequestBody::SubmitSm(message(sm)),
        Pdu::DeliverSm(sm) => RequestBody::DeliverSm(message(sm)),
        Pdu::EnquireLink => RequestBody::EnquireLink,
        Pdu::Unbind => RequestBody::Unbind,
        _ => RequestBody::Other(frame.command()),
    };

    SmppRequest {
        sequence_number: Some(frame.sequence()),
        body,
    }
}

/// Map an outbound request to a frame carrying `sequence`.
///
/// Returns `None` for `RequestBody::Other`, which has no wire body to send.
pub fn to_frame(request: &SmppRequest, sequence: u32) -> Option<PduFrame> {
    let pdu = match &request.body {
        RequestBody::Bind(bind) => {
            let body = Bind {
                system_id: bind.system_id.clone(),
                password: bind.password.clone(),
                system_type: bind.system_type.clone(),
                interface_version: VERSION_3_4,
                addr_ton: 0,
                addr_npi: 0,
                address_range: bind.address_range.clone(),
            };
            match bind.bind_type {
                BindType::Transmitter => Pdu::BindTransmitter(body),
                BindType::Receiver => Pdu::BindReceiver(body),
                BindType::Transceiver => Pdu::BindTransceiver(body),
            }
        }
        RequestBody::SubmitSm(msg) => Pdu::SubmitSm(Box::new(short_message(msg))),
        RequestBody::DeliverSm(msg) => Pdu::DeliverSm(Box::new(short_message(msg))),
        RequestBody::EnquireLink => Pdu::EnquireLink,
        RequestBody::Unbind => Pdu::Unbind,
        RequestBody::Other(_) => return None,
    };
    Some(PduFrame::request(sequence, pdu))
}

/// Map a response frame received from the client.
pub fn to_response(frame: &PduFrame) -> SmppResponse {
    let message_id = match &frame.pdu {
        Pdu::SubmitSmResp(resp) | Pdu::DeliverSmResp(resp) if !resp.message_id.is_empty() => {
            Some(resp.message_id.clone())
        }
        _ => None,
    };

    SmppResponse {
        command_id: frame.command(),
        sequence_number: frame.sequence(),
        status: frame.status(),
        message_id,
    }
}

fn bind_request(bind_type: BindType, bind: &Bind) -> BindRequest {
    BindRequest {
        bind_type,
        system_id: bind.system_id.clone(),
        password: bind.password.clone(),
        system_type: bind.system_type.clone(),
        address_range: bind.address_range.clone(),
    }
}

fn message(sm: &ShortMessage) -> Message {
    Message {
        source: sm.source.clone(),
        destination: sm.destination.clone(),
        esm_class: sm.esm_class,
        registered_delivery: sm.registered_delivery,
        data_coding: sm.data_coding,
        short_message: sm.short_message.clone(),
        tlvs: sm.tlvs.clone(),
    }
}

fn short_message(msg: &Message) -> ShortMessage {
    ShortMessage {
        source: msg.source.clone(),
        destination: msg.destination.clone(),
        esm_class: msg.esm_class,
        registered_delivery: msg.registered_delivery,
        data_coding: msg.data_coding,
        short_message: msg.short_message.clone(),
        tlvs: msg.tlvs.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Address, CommandId, MessageResp, Status};

    #[test]
    fn test_bind_maps_type_and_credentials() {
        let frame = PduFrame::request(
            12,
            Pdu::BindTransmitter(Bind {
                system_id: "esme01".into(),
                password: "pw".into(),
                ..Default::default()
            }),
        );

        let request = to_request(&frame);
        assert_eq!(request.sequence_number, Some(12));
        match request.body {
            RequestBody::Bind(bind) => {
                assert_eq!(bind.bind_type, BindType::Transmitter);
                assert_eq!(bind.system_id, "esme01");
                assert_eq!(bind.password, "pw");
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_deliver_sm_to_frame() {
        let msg = Message::new(
            Address::new(1, 1, "258841234567"),
            Address::new(5, 0, "ACME"),
            "reply",
        )
        .with_esm_class(0x04);

        let frame = to_frame(&SmppRequest::deliver_sm(msg), 40).unwrap();
        assert_eq!(frame.sequence(), 40);
        assert_eq!(frame.command(), CommandId::DeliverSm);
        match frame.pdu {
            Pdu::DeliverSm(sm) => {
                assert_eq!(sm.esm_class, 0x04);
                assert_eq!(sm.short_message.as_ref(), b"reply");
            }
            other => panic!("unexpected pdu {:?}", other),
        }
    }

    #[test]
    fn test_other_request_has_no_frame() {
        let request = SmppRequest::new(RequestBody::Other(CommandId::Other(0x0103)));
        assert!(to_frame(&request, 1).is_none());
    }

    #[test]
    fn test_response_message_id() {
        let frame = PduFrame::new(
            3,
            Status::Ok,
            Pdu::DeliverSmResp(MessageResp {
                message_id: String::new(),
                ..Default::default()
            }),
        );
        let response = to_response(&frame);
        assert_eq!(response.command_id, CommandId::DeliverSmResp);
        assert_eq!(response.message_id, None);
        assert!(response.is_ok());
    }
}
