//! Short message PDUs. `submit_sm` and `deliver_sm` share an identical wire
//! layout, so both bodies come out of the same macro; only the command ids
//! and response shapes differ.

use std::io::Cursor;

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, FixedOffset};

use crate::codec::{put_cstring, read_cstring, read_string, read_u8, CodecError};
use crate::datetime;
use crate::pdu::tlv::Options;
use crate::pdu::{cstring_opts_marshal, cstring_opts_unmarshal, write_time};

/// Messaging modes for [`EsmClass`].
pub const ESM_MODE_DEFAULT: u8 = 0x0;
pub const ESM_MODE_DATAGRAM: u8 = 0x1;
pub const ESM_MODE_FORWARD: u8 = 0x2;
pub const ESM_MODE_STORE_AND_FORWARD: u8 = 0x3;

/// Message types for [`EsmClass`].
pub const ESM_TYPE_DEFAULT: u8 = 0x0;
pub const ESM_TYPE_DELIVERY_RECEIPT: u8 = 0x1;
pub const ESM_TYPE_DELIVERY_ACK: u8 = 0x2;
pub const ESM_TYPE_USER_ACK: u8 = 0x4;
pub const ESM_TYPE_CONVERSATION_ABORT: u8 = 0x6;
pub const ESM_TYPE_INTERMEDIATE_NOTIFICATION: u8 = 0x8;

/// GSM network features for [`EsmClass`].
pub const ESM_FEAT_NONE: u8 = 0x0;
pub const ESM_FEAT_UDHI: u8 = 0x1;
pub const ESM_FEAT_REPLY_PATH: u8 = 0x2;
pub const ESM_FEAT_UDHI_REPLY_PATH: u8 = 0x3;

/// Receipt requests for [`RegisteredDelivery`].
pub const DELIVERY_RECEIPT_NONE: u8 = 0x0;
pub const DELIVERY_RECEIPT_ALWAYS: u8 = 0x1;
pub const DELIVERY_RECEIPT_ON_FAILURE: u8 = 0x2;

/// SME acknowledgement requests for [`RegisteredDelivery`].
pub const SME_ACK_NONE: u8 = 0x0;
pub const SME_ACK_DELIVERY: u8 = 0x1;
pub const SME_ACK_MANUAL: u8 = 0x2;
pub const SME_ACK_ALL: u8 = 0x3;

/// Special message attributes packed into the `esm_class` byte: messaging
/// mode in bits 0-1, message type in bits 2-5, GSM features in bits 6-7.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EsmClass {
    pub mode: u8,
    pub msg_type: u8,
    pub feature: u8,
}

impl EsmClass {
    pub fn to_byte(self) -> u8 {
        self.mode | (self.msg_type << 2) | (self.feature << 6)
    }

    pub fn from_byte(b: u8) -> Self {
        EsmClass {
            mode: b & 0x03,
            msg_type: (b >> 2) & 0x0F,
            feature: b >> 6,
        }
    }
}

/// Receipt and acknowledgement requests packed into the
/// `registered_delivery` byte: receipt in bits 0-1, SME acks in bits 2-3,
/// intermediate notification in bit 4.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisteredDelivery {
    pub receipt: u8,
    pub sme_ack: u8,
    pub intermediate_notification: u8,
}

impl RegisteredDelivery {
    pub fn to_byte(self) -> u8 {
        self.receipt | (self.sme_ack << 2) | (self.intermediate_notification << 4)
    }

    pub fn from_byte(b: u8) -> Self {
        RegisteredDelivery {
            receipt: b & 0x03,
            sme_ack: (b >> 2) & 0x0F,
            intermediate_notification: (b >> 4) & 0x01,
        }
    }
}

macro_rules! short_message_pdu {
    ($(#[$attr:meta])* $name:ident, $wire:literal) => {
        $(#[$attr])*
        ///
        /// `sm_length` is not a field: it is computed from `short_message`
        /// when the body is marshaled.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            pub service_type: String,
            pub source_addr_ton: u8,
            pub source_addr_npi: u8,
            pub source_addr: String,
            pub dest_addr_ton: u8,
            pub dest_addr_npi: u8,
            pub destination_addr: String,
            pub esm_class: EsmClass,
            pub protocol_id: u8,
            pub priority_flag: u8,
            pub schedule_delivery_time: Option<DateTime<FixedOffset>>,
            pub validity_period: Option<DateTime<FixedOffset>>,
            pub registered_delivery: RegisteredDelivery,
            pub replace_if_present_flag: u8,
            pub data_coding: u8,
            pub sm_default_msg_id: u8,
            pub short_message: String,
            pub options: Option<Options>,
        }

        impl $name {
            pub(crate) fn marshal(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
                if self.short_message.len() > 254 {
                    return Err(CodecError::InvalidStringLength("short_message"));
                }
                put_cstring(buf, &self.service_type);
                buf.put_u8(self.source_addr_ton);
                buf.put_u8(self.source_addr_npi);
                put_cstring(buf, &self.source_addr);
                buf.put_u8(self.dest_addr_ton);
                buf.put_u8(self.dest_addr_npi);
                put_cstring(buf, &self.destination_addr);
                buf.put_u8(self.esm_class.to_byte());
                buf.put_u8(self.protocol_id);
                buf.put_u8(self.priority_flag);
                write_time(&self.schedule_delivery_time, buf)?;
                write_time(&self.validity_period, buf)?;
                buf.put_u8(self.registered_delivery.to_byte());
                buf.put_u8(self.replace_if_present_flag);
                buf.put_u8(self.data_coding);
                buf.put_u8(self.sm_default_msg_id);
                buf.put_u8(self.short_message.len() as u8);
                buf.extend_from_slice(self.short_message.as_bytes());
                if let Some(opts) = &self.options {
                    opts.marshal(buf);
                }
                Ok(())
            }

            pub(crate) fn unmarshal(body: &[u8]) -> Result<Self, CodecError> {
                if body.len() < 25 {
                    return Err(CodecError::BodyTooShort($wire));
                }
                let mut cur = Cursor::new(body);
                let service_type = read_cstring(&mut cur, 6, "service_type")?;
                let source_addr_ton = read_u8(&mut cur, "source_addr_ton")?;
                let source_addr_npi = read_u8(&mut cur, "source_addr_npi")?;
                let source_addr = read_cstring(&mut cur, 21, "source_addr")?;
                let dest_addr_ton = read_u8(&mut cur, "dest_addr_ton")?;
                let dest_addr_npi = read_u8(&mut cur, "dest_addr_npi")?;
                let destination_addr = read_cstring(&mut cur, 21, "destination_addr")?;
                let esm_class = EsmClass::from_byte(read_u8(&mut cur, "esm_class")?);
                let protocol_id = read_u8(&mut cur, "protocol_id")?;
                let priority_flag = read_u8(&mut cur, "priority_flag")?;
                let sched = read_cstring(&mut cur, 17, "schedule_delivery_time")?;
                let schedule_delivery_time = datetime::parse(sched.as_bytes())?;
                let valid = read_cstring(&mut cur, 17, "validity_period")?;
                let validity_period = datetime::parse(valid.as_bytes())?;
                let registered_delivery =
                    RegisteredDelivery::from_byte(read_u8(&mut cur, "registered_delivery")?);
                let replace_if_present_flag = read_u8(&mut cur, "replace_if_present_flag")?;
                let data_coding = read_u8(&mut cur, "data_coding")?;
                let sm_default_msg_id = read_u8(&mut cur, "sm_default_msg_id")?;
                let short_message = read_string(&mut cur, 254, "short_message")?;
                let options = if cur.has_remaining() {
                    let rest = &body[cur.position() as usize..];
                    Some(Options::unmarshal(rest)?)
                } else {
                    None
                };
                Ok($name {
                    service_type,
                    source_addr_ton,
                    source_addr_npi,
                    source_addr,
                    dest_addr_ton,
                    dest_addr_npi,
                    destination_addr,
                    esm_class,
                    protocol_id,
                    priority_flag,
                    schedule_delivery_time,
                    validity_period,
                    registered_delivery,
                    replace_if_present_flag,
                    data_coding,
                    sm_default_msg_id,
                    short_message,
                    options,
                })
            }
        }
    };
}

short_message_pdu!(
    /// Body of `submit_sm`: an ESME submitting a short message to the SMSC.
    SubmitSm,
    "submit_sm"
);

short_message_pdu!(
    /// Body of `deliver_sm`: the SMSC delivering a short message or a
    /// delivery receipt to an ESME.
    DeliverSm,
    "deliver_sm"
);

impl SubmitSm {
    /// Creates the matching `submit_sm_resp` carrying the assigned message
    /// id.
    pub fn response(&self, message_id: &str) -> SubmitSmResp {
        SubmitSmResp {
            message_id: message_id.to_owned(),
            options: None,
        }
    }
}

impl DeliverSm {
    /// Creates the matching `deliver_sm_resp`.
    pub fn response(&self) -> DeliverSmResp {
        DeliverSmResp::default()
    }
}

/// Body of `submit_sm_resp`: the SMSC-assigned message id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitSmResp {
    pub message_id: String,
    pub options: Option<Options>,
}

impl SubmitSmResp {
    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        cstring_opts_marshal(&self.message_id, &self.options, buf);
    }

    pub(crate) fn unmarshal(body: &[u8]) -> Result<Self, CodecError> {
        let (message_id, options) = cstring_opts_unmarshal(body, "message_id")?;
        Ok(SubmitSmResp { message_id, options })
    }
}

/// Body of `deliver_sm_resp`. The message id is unused in SMPP 3.4: the
/// wire form is a single null byte and any received body is ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliverSmResp {
    pub message_id: String,
}

impl DeliverSmResp {
    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        buf.put_u8(0);
    }

    pub(crate) fn unmarshal(_body: &[u8]) -> Result<Self, CodecError> {
        Ok(DeliverSmResp::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        let s: String = s.chars().filter(|c| *c != '|').collect();
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    // Body vector from the submit/response round-trip scenario.
    const SUBMIT_BODY: &str = "00|00|00|7465737400|00|00|746573743200|00|00|00|00|00|00|00|00|00|03|6d7367";

    #[test]
    fn esm_class_packs_and_parses() {
        let ec = EsmClass {
            mode: ESM_MODE_STORE_AND_FORWARD,
            msg_type: ESM_TYPE_DELIVERY_RECEIPT,
            feature: ESM_FEAT_UDHI,
        };
        assert_eq!(ec.to_byte(), 0b0100_0111);
        assert_eq!(EsmClass::from_byte(ec.to_byte()), ec);
    }

    #[test]
    fn registered_delivery_packs_and_parses() {
        let rd = RegisteredDelivery {
            receipt: DELIVERY_RECEIPT_ALWAYS,
            sme_ack: SME_ACK_ALL,
            intermediate_notification: 1,
        };
        assert_eq!(rd.to_byte(), 0b0001_1101);
        assert_eq!(RegisteredDelivery::from_byte(rd.to_byte()), rd);
    }

    #[test]
    fn submit_sm_marshal_matches_canonical_bytes() {
        let sm = SubmitSm {
            source_addr: "test".into(),
            destination_addr: "test2".into(),
            short_message: "msg".into(),
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        sm.marshal(&mut buf).unwrap();
        assert_eq!(&buf[..], &hex(SUBMIT_BODY)[..]);
    }

    #[test]
    fn submit_sm_unmarshal_canonical_bytes() {
        let sm = SubmitSm::unmarshal(&hex(SUBMIT_BODY)).unwrap();
        assert_eq!(
            sm,
            SubmitSm {
                source_addr: "test".into(),
                destination_addr: "test2".into(),
                short_message: "msg".into(),
                ..Default::default()
            }
        );
    }

    // Near-maximal short message plus a user_message_reference TLV.
    const LONG_BODY: &str = "00010161736466000101333831363331323334353400000001000000000100f76161736466617364666173646661736466206173646661736466617364666173646661207364666173642066612073646620617364206661207364666173642066612064666173646661736466617364666173646620617364666173646661736466617364666120736466617364206661207364662061736420666120736466617364206661206466617364666173646661736466617364666173646661736431313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313131313102040002006f";

    fn long_message() -> String {
        let mut m = String::from(
            "aasdfasdfasdfasdf asdfasdfasdfasdfa sdfasd fa sdf asd fa sdfasd fa \
             dfasdfasdfasdfasdf asdfasdfasdfasdfa sdfasd fa sdf asd fa sdfasd fa \
             dfasdfasdfasdfasdfasdfasd",
        );
        m.push_str(&"1".repeat(87));
        m
    }

    #[test]
    fn submit_sm_long_message_roundtrip() {
        let sm = SubmitSm {
            source_addr_ton: 1,
            source_addr_npi: 1,
            source_addr: "asdf".into(),
            dest_addr_ton: 1,
            dest_addr_npi: 1,
            destination_addr: "38163123454".into(),
            priority_flag: 1,
            data_coding: 1,
            short_message: long_message(),
            options: Some(Options::new().set_user_message_reference(0x6F)),
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        sm.marshal(&mut buf).unwrap();
        assert_eq!(&buf[..], &hex(LONG_BODY)[..]);
        assert_eq!(SubmitSm::unmarshal(&buf).unwrap(), sm);
    }

    #[test]
    fn deliver_sm_shares_the_wire_layout() {
        let dm = DeliverSm::unmarshal(&hex(LONG_BODY)).unwrap();
        assert_eq!(dm.destination_addr, "38163123454");
        assert_eq!(dm.short_message, long_message());
        assert_eq!(
            dm.options.as_ref().and_then(|o| o.user_message_reference()),
            Some(0x6F)
        );
        let mut buf = BytesMut::new();
        dm.marshal(&mut buf).unwrap();
        assert_eq!(&buf[..], &hex(LONG_BODY)[..]);
    }

    #[test]
    fn sm_body_too_short() {
        assert!(matches!(
            SubmitSm::unmarshal(&[0u8; 24]),
            Err(CodecError::BodyTooShort("submit_sm"))
        ));
        assert!(matches!(
            DeliverSm::unmarshal(&[0u8; 10]),
            Err(CodecError::BodyTooShort("deliver_sm"))
        ));
    }

    #[test]
    fn sm_rejects_oversized_short_message_on_encode() {
        let sm = SubmitSm {
            short_message: "x".repeat(255),
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        assert!(matches!(
            sm.marshal(&mut buf),
            Err(CodecError::InvalidStringLength("short_message"))
        ));
    }

    #[test]
    fn deliver_sm_resp_is_a_single_null_byte() {
        let mut buf = BytesMut::new();
        DeliverSmResp::default().marshal(&mut buf);
        assert_eq!(&buf[..], &[0u8]);
        assert_eq!(
            DeliverSmResp::unmarshal(&[0]).unwrap(),
            DeliverSmResp::default()
        );
    }

    #[test]
    fn submit_sm_resp_roundtrip() {
        let resp = SubmitSmResp {
            message_id: "id0".into(),
            options: None,
        };
        let mut buf = BytesMut::new();
        resp.marshal(&mut buf);
        assert_eq!(&buf[..], b"id0\0");
        assert_eq!(SubmitSmResp::unmarshal(&buf).unwrap(), resp);
    }
}
