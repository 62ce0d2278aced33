//! Optional PDU parameters: a map from a two byte tag to raw bytes with
//! typed helpers for the commonly used tags.

use std::collections::BTreeMap;
use std::io::Cursor;

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::CodecError;

/// Optional parameter tags defined by SMPP v3.4.
pub mod tags {
    pub const DEST_ADDR_SUBUNIT: u16 = 0x0005;
    pub const DEST_NETWORK_TYPE: u16 = 0x0006;
    pub const DEST_BEARER_TYPE: u16 = 0x0007;
    pub const DEST_TELEMATICS_ID: u16 = 0x0008;
    pub const SOURCE_ADDR_SUBUNIT: u16 = 0x000D;
    pub const SOURCE_NETWORK_TYPE: u16 = 0x000E;
    pub const SOURCE_BEARER_TYPE: u16 = 0x000F;
    pub const SOURCE_TELEMATICS_ID: u16 = 0x0010;
    pub const QOS_TIME_TO_LIVE: u16 = 0x0017;
    pub const PAYLOAD_TYPE: u16 = 0x0019;
    pub const ADDITIONAL_STATUS_INFO_TEXT: u16 = 0x001D;
    pub const RECEIPTED_MESSAGE_ID: u16 = 0x001E;
    pub const MS_MSG_WAIT_FACILITIES: u16 = 0x0030;
    pub const PRIVACY_INDICATOR: u16 = 0x0201;
    pub const SOURCE_SUBADDRESS: u16 = 0x0202;
    pub const DEST_SUBADDRESS: u16 = 0x0203;
    pub const USER_MESSAGE_REFERENCE: u16 = 0x0204;
    pub const USER_RESPONSE_CODE: u16 = 0x0205;
    pub const SOURCE_PORT: u16 = 0x020A;
    pub const DESTINATION_PORT: u16 = 0x020B;
    pub const SAR_MSG_REF_NUM: u16 = 0x020C;
    pub const LANGUAGE_INDICATOR: u16 = 0x020D;
    pub const SAR_TOTAL_SEGMENTS: u16 = 0x020E;
    pub const SAR_SEGMENT_SEQNUM: u16 = 0x020F;
    pub const SC_INTERFACE_VERSION: u16 = 0x0210;
    pub const CALLBACK_NUM_PRES_IND: u16 = 0x0302;
    pub const CALLBACK_NUM_ATAG: u16 = 0x0303;
    pub const NUMBER_OF_MESSAGES: u16 = 0x0304;
    pub const CALLBACK_NUM: u16 = 0x0381;
    pub const DPF_RESULT: u16 = 0x0420;
    pub const SET_DPF: u16 = 0x0421;
    pub const MS_AVAILABILITY_STATUS: u16 = 0x0422;
    pub const NETWORK_ERROR_CODE: u16 = 0x0423;
    pub const MESSAGE_PAYLOAD: u16 = 0x0424;
    pub const DELIVERY_FAILURE_REASON: u16 = 0x0425;
    pub const MORE_MESSAGES_TO_SEND: u16 = 0x0426;
    pub const MESSAGE_STATE: u16 = 0x0427;
    pub const USSD_SERVICE_OP: u16 = 0x0501;
    pub const DISPLAY_TIME: u16 = 0x1201;
    pub const SMS_SIGNAL: u16 = 0x1203;
    pub const MS_VALIDITY: u16 = 0x1204;
    pub const ALERT_ON_MESSAGE_DELIVERY: u16 = 0x130C;
    pub const ITS_REPLY_TYPE: u16 = 0x1380;
    pub const ITS_SESSION_INFO: u16 = 0x1383;
}

/// TLV container appended to PDU bodies.
///
/// Last write wins on duplicate tags. Marshal emits records in ascending
/// tag order so encoder output is deterministic; unmarshal accepts any
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    fields: BTreeMap<u16, Vec<u8>>,
}

impl Options {
    pub fn new() -> Self {
        Options::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Assigns a raw TLV field.
    pub fn set(mut self, tag: u16, value: Vec<u8>) -> Self {
        self.fields.insert(tag, value);
        self
    }

    /// Assigns a TLV field holding one byte.
    pub fn set_u8(self, tag: u16, value: u8) -> Self {
        self.set(tag, vec![value])
    }

    /// Assigns a TLV field holding a big-endian two byte integer.
    pub fn set_u16(self, tag: u16, value: u16) -> Self {
        self.set(tag, value.to_be_bytes().to_vec())
    }

    /// Assigns a TLV field holding a bare string.
    pub fn set_string(self, tag: u16, value: &str) -> Self {
        self.set(tag, value.as_bytes().to_vec())
    }

    /// Assigns a TLV field holding a null-terminated string.
    pub fn set_cstring(self, tag: u16, value: &str) -> Self {
        let mut v = value.as_bytes().to_vec();
        v.push(0);
        self.set(tag, v)
    }

    pub fn get(&self, tag: u16) -> Option<&[u8]> {
        self.fields.get(&tag).map(Vec::as_slice)
    }

    pub fn get_u8(&self, tag: u16) -> Option<u8> {
        self.get(tag).and_then(|v| v.first().copied())
    }

    pub fn get_u16(&self, tag: u16) -> Option<u16> {
        self.get(tag)
            .filter(|v| v.len() >= 2)
            .map(|v| u16::from_be_bytes([v[0], v[1]]))
    }

    pub fn get_string(&self, tag: u16) -> Option<String> {
        self.get(tag)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn get_cstring(&self, tag: u16) -> Option<String> {
        self.get(tag).filter(|v| !v.is_empty()).map(|v| {
            let end = v.iter().position(|&b| b == 0).unwrap_or(v.len());
            String::from_utf8_lossy(&v[..end]).into_owned()
        })
    }

    pub fn user_message_reference(&self) -> Option<u16> {
        self.get_u16(tags::USER_MESSAGE_REFERENCE)
    }

    pub fn set_user_message_reference(self, value: u16) -> Self {
        self.set_u16(tags::USER_MESSAGE_REFERENCE, value)
    }

    pub fn sar_msg_ref_num(&self) -> Option<u16> {
        self.get_u16(tags::SAR_MSG_REF_NUM)
    }

    pub fn set_sar_msg_ref_num(self, value: u16) -> Self {
        self.set_u16(tags::SAR_MSG_REF_NUM, value)
    }

    pub fn sar_total_segments(&self) -> Option<u8> {
        self.get_u8(tags::SAR_TOTAL_SEGMENTS)
    }

    pub fn set_sar_total_segments(self, value: u8) -> Self {
        self.set_u8(tags::SAR_TOTAL_SEGMENTS, value)
    }

    pub fn sar_segment_seqnum(&self) -> Option<u8> {
        self.get_u8(tags::SAR_SEGMENT_SEQNUM)
    }

    pub fn set_sar_segment_seqnum(self, value: u8) -> Self {
        self.set_u8(tags::SAR_SEGMENT_SEQNUM, value)
    }

    pub fn sc_interface_version(&self) -> Option<u8> {
        self.get_u8(tags::SC_INTERFACE_VERSION)
    }

    pub fn set_sc_interface_version(self, value: u8) -> Self {
        self.set_u8(tags::SC_INTERFACE_VERSION, value)
    }

    pub fn message_payload(&self) -> Option<String> {
        self.get_string(tags::MESSAGE_PAYLOAD)
    }

    pub fn set_message_payload(self, value: &str) -> Self {
        self.set_string(tags::MESSAGE_PAYLOAD, value)
    }

    pub fn message_state(&self) -> Option<u8> {
        self.get_u8(tags::MESSAGE_STATE)
    }

    pub fn set_message_state(self, value: u8) -> Self {
        self.set_u8(tags::MESSAGE_STATE, value)
    }

    pub fn receipted_message_id(&self) -> Option<String> {
        self.get_cstring(tags::RECEIPTED_MESSAGE_ID)
    }

    pub fn set_receipted_message_id(self, value: &str) -> Self {
        self.set_cstring(tags::RECEIPTED_MESSAGE_ID, value)
    }

    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        for (tag, value) in &self.fields {
            buf.put_u16(*tag);
            buf.put_u16(value.len() as u16);
            buf.extend_from_slice(value);
        }
    }

    pub(crate) fn unmarshal(body: &[u8]) -> Result<Self, CodecError> {
        let mut fields = BTreeMap::new();
        let mut cur = Cursor::new(body);
        while cur.has_remaining() {
            if cur.remaining() < 4 {
                return Err(CodecError::InvalidTlvLength);
            }
            let tag = cur.get_u16();
            let len = cur.get_u16() as usize;
            if cur.remaining() < len {
                return Err(CodecError::InvalidTlvLength);
            }
            let mut value = vec![0u8; len];
            cur.copy_to_slice(&mut value);
            fields.insert(tag, value);
        }
        Ok(Options { fields })
    }
}
