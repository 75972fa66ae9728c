//! SMPP v3.4 wire codec.
//!
//! Frames PDUs on the byte stream (16-byte header, length-prefixed) and
//! converts them to and from the closed [`Pdu`] model. The session engine only
//! ever hands `PduFrame`s to this module and gets opaque bytes back.

mod command;
mod pdu;
mod tlv;

pub use command::{CommandId, Status};
pub use pdu::{
    Address, Bind, BindResp, BindType, Header, MessageResp, Pdu, PduFrame, PduKind, ShortMessage,
};
pub use tlv::{Tlv, TlvMap, TAG_MESSAGE_PAYLOAD, TAG_SC_INTERFACE_VERSION, VERSION_3_4};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Header length in bytes.
pub const HEADER_LEN: usize = 16;

/// Largest PDU accepted from the wire.
pub const MAX_PDU_LEN: usize = 65_536;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid command_length {length}, must be 16-65536")]
    InvalidLength { length: usize },

    #[error("PDU truncated while reading '{0}'")]
    Truncated(&'static str),

    #[error("field '{field}' exceeds {max} bytes")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("field '{field}' is not valid UTF-8: {source}")]
    Utf8 {
        field: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("TLV error: {0}")]
    Tlv(String),
}

/// Length-prefixed SMPP framing for `tokio_util::codec`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmppCodec;

impl SmppCodec {
    pub fn new() -> Self {
        Self
    }

    /// Encode a frame into a standalone buffer.
    pub fn encode_frame(&self, frame: &PduFrame) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(64);
        write_frame(frame, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode exactly one complete frame from `data`.
    pub fn decode_frame(&self, data: &[u8]) -> Result<PduFrame, CodecError> {
        let mut buf = BytesMut::from(data);
        match read_frame(&mut buf)? {
            Some(frame) => Ok(frame),
            None => Err(CodecError::Truncated("header")),
        }
    }
}

impl Decoder for SmppCodec {
    type Item = PduFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<PduFrame>, CodecError> {
        read_frame(src)
    }
}

impl Encoder<PduFrame> for SmppCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: PduFrame, dst: &mut BytesMut) -> Result<(), CodecError> {
        write_frame(&frame, dst)
    }
}

fn read_frame(src: &mut BytesMut) -> Result<Option<PduFrame>, CodecError> {
    if src.len() < HEADER_LEN {
        return Ok(None);
    }

    let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if !(HEADER_LEN..=MAX_PDU_LEN).contains(&length) {
        return Err(CodecError::InvalidLength { length });
    }

    if src.len() < length {
        src.reserve(length - src.len());
        return Ok(None);
    }

    let mut raw = src.split_to(length).freeze();
    raw.advance(4);
    let command = CommandId::from_u32(raw.get_u32());
    let status = Status::from_u32(raw.get_u32());
    let sequence = raw.get_u32();

    let pdu = Pdu::decode_body(command, raw)?;

    Ok(Some(PduFrame {
        header: Header {
            command,
            status,
            sequence,
        },
        pdu,
    }))
}

fn write_frame(frame: &PduFrame, dst: &mut BytesMut) -> Result<(), CodecError> {
    let start = dst.len();
    dst.put_u32(0);
    dst.put_u32(frame.pdu.command_id().as_u32());
    dst.put_u32(frame.header.status.as_u32());
    dst.put_u32(frame.header.sequence);
    if let Err(e) = frame.pdu.encode_body(dst) {
        dst.truncate(start);
        return Err(e);
    }

    let length = dst.len() - start;
    if length > MAX_PDU_LEN {
        dst.truncate(start);
        return Err(CodecError::InvalidLength { length });
    }
    dst[start..start + 4].copy_from_slice(&(length as u32).to_be_bytes());
    Ok(())
}
