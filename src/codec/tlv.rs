//! Optional tagged parameters (TLVs).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::CodecError;

/// `sc_interface_version` tag, sent in bind responses.
pub const TAG_SC_INTERFACE_VERSION: u16 = 0x0210;

/// `message_payload` tag.
pub const TAG_MESSAGE_PAYLOAD: u16 = 0x0424;

/// SMPP interface version 3.4.
pub const VERSION_3_4: u8 = 0x34;

/// A single tag-length-value parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tag: u16,
    pub value: Bytes,
}

impl Tlv {
    pub fn new(tag: u16, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }
}

/// Ordered set of TLVs; wire order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvMap {
    entries: Vec<Tlv>,
}

impl TlvMap {
    /// Insert or replace the parameter with the same tag.
    pub fn insert(&mut self, tlv: Tlv) {
        match self.entries.iter_mut().find(|t| t.tag == tlv.tag) {
            Some(existing) => *existing = tlv,
            None => self.entries.push(tlv),
        }
    }

    pub fn get(&self, tag: u16) -> Option<&Tlv> {
        self.entries.iter().find(|t| t.tag == tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tlv> {
        self.entries.iter()
    }

    /// Decode every remaining byte of `buf` as TLVs.
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        let mut map = TlvMap::default();
        while buf.has_remaining() {
            if buf.remaining() < 4 {
                return Err(CodecError::Tlv("truncated TLV header".into()));
            }
            let tag = buf.get_u16();
            let len = buf.get_u16() as usize;
            if buf.remaining() < len {
                return Err(CodecError::Tlv(format!(
                    "TLV {:#06x} declares {} bytes, {} available",
                    tag,
                    len,
                    buf.remaining()
                )));
            }
            let value = buf.split_to(len);
            map.entries.push(Tlv { tag, value });
        }
        Ok(map)
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        for tlv in &self.entries {
            let len = u16::try_from(tlv.value.len())
                .map_err(|_| CodecError::Tlv(format!("value of tag {:#06x} exceeds 65535 bytes", tlv.tag)))?;
            buf.put_u16(tlv.tag);
            buf.put_u16(len);
            buf.put_slice(&tlv.value);
        }
        Ok(())
    }
}
