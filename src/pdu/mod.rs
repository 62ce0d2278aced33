//! PDU bodies and their binary codecs.
//!
//! [`Pdu`] is the tagged variant over every supported command. Empty-body
//! PDUs are unit variants; the commands the engine recognizes but does not
//! implement (`replace_sm`, `cancel_sm`, `outbind`, `submit_multi`,
//! `alert_notification`, `data_sm` and their responses) are placeholder
//! variants whose marshal and unmarshal fail with
//! [`CodecError::Unsupported`].

mod bind;
mod command_id;
mod command_status;
mod message;
mod query;
mod receipt;
pub mod tlv;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, FixedOffset};

pub use bind::{Bind, BindResp};
pub use command_id::CommandId;
pub use command_status::CommandStatus;
pub use message::{
    DeliverSm, DeliverSmResp, EsmClass, RegisteredDelivery, SubmitSm, SubmitSmResp,
    DELIVERY_RECEIPT_ALWAYS, DELIVERY_RECEIPT_NONE, DELIVERY_RECEIPT_ON_FAILURE,
    ESM_FEAT_NONE, ESM_FEAT_REPLY_PATH, ESM_FEAT_UDHI, ESM_FEAT_UDHI_REPLY_PATH,
    ESM_MODE_DATAGRAM, ESM_MODE_DEFAULT, ESM_MODE_FORWARD, ESM_MODE_STORE_AND_FORWARD,
    ESM_TYPE_CONVERSATION_ABORT, ESM_TYPE_DELIVERY_ACK, ESM_TYPE_DELIVERY_RECEIPT,
    ESM_TYPE_DEFAULT, ESM_TYPE_INTERMEDIATE_NOTIFICATION, ESM_TYPE_USER_ACK,
    SME_ACK_ALL, SME_ACK_DELIVERY, SME_ACK_MANUAL, SME_ACK_NONE,
};
pub use query::{QuerySm, QuerySmResp};
pub use receipt::{stat, DeliveryReceipt};
pub use tlv::{tags, Options};

use crate::codec::CodecError;
use crate::datetime::{self, Layout};

/// A protocol data unit body, tagged by command.
#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    BindReceiver(Bind),
    BindReceiverResp(BindResp),
    BindTransmitter(Bind),
    BindTransmitterResp(BindResp),
    BindTransceiver(Bind),
    BindTransceiverResp(BindResp),
    QuerySm(QuerySm),
    QuerySmResp(QuerySmResp),
    SubmitSm(SubmitSm),
    SubmitSmResp(SubmitSmResp),
    DeliverSm(DeliverSm),
    DeliverSmResp(DeliverSmResp),
    Unbind,
    UnbindResp,
    EnquireLink,
    EnquireLinkResp,
    GenericNack,
    // Recognized but not implemented.
    ReplaceSm,
    ReplaceSmResp,
    CancelSm,
    CancelSmResp,
    Outbind,
    SubmitMulti,
    SubmitMultiResp,
    AlertNotification,
    DataSm,
    DataSmResp,
}

impl Pdu {
    pub fn command_id(&self) -> CommandId {
        match self {
            Pdu::BindReceiver(_) => CommandId::BindReceiver,
            Pdu::BindReceiverResp(_) => CommandId::BindReceiverResp,
            Pdu::BindTransmitter(_) => CommandId::BindTransmitter,
            Pdu::BindTransmitterResp(_) => CommandId::BindTransmitterResp,
            Pdu::BindTransceiver(_) => CommandId::BindTransceiver,
            Pdu::BindTransceiverResp(_) => CommandId::BindTransceiverResp,
            Pdu::QuerySm(_) => CommandId::QuerySm,
            Pdu::QuerySmResp(_) => CommandId::QuerySmResp,
            Pdu::SubmitSm(_) => CommandId::SubmitSm,
            Pdu::SubmitSmResp(_) => CommandId::SubmitSmResp,
            Pdu::DeliverSm(_) => CommandId::DeliverSm,
            Pdu::DeliverSmResp(_) => CommandId::DeliverSmResp,
            Pdu::Unbind => CommandId::Unbind,
            Pdu::UnbindResp => CommandId::UnbindResp,
            Pdu::EnquireLink => CommandId::EnquireLink,
            Pdu::EnquireLinkResp => CommandId::EnquireLinkResp,
            Pdu::GenericNack => CommandId::GenericNack,
            Pdu::ReplaceSm => CommandId::ReplaceSm,
            Pdu::ReplaceSmResp => CommandId::ReplaceSmResp,
            Pdu::CancelSm => CommandId::CancelSm,
            Pdu::CancelSmResp => CommandId::CancelSmResp,
            Pdu::Outbind => CommandId::Outbind,
            Pdu::SubmitMulti => CommandId::SubmitMulti,
            Pdu::SubmitMultiResp => CommandId::SubmitMultiResp,
            Pdu::AlertNotification => CommandId::AlertNotification,
            Pdu::DataSm => CommandId::DataSm,
            Pdu::DataSmResp => CommandId::DataSmResp,
        }
    }

    /// True for PDUs that open a request/response exchange.
    pub fn is_request(&self) -> bool {
        self.command_id().is_request()
    }

    /// Extracts the peer system id when this PDU carries one.
    pub fn system_id(&self) -> Option<&str> {
        match self {
            Pdu::BindReceiver(b) | Pdu::BindTransmitter(b) | Pdu::BindTransceiver(b) => {
                Some(&b.system_id)
            }
            Pdu::BindReceiverResp(r)
            | Pdu::BindTransmitterResp(r)
            | Pdu::BindTransceiverResp(r) => Some(&r.system_id),
            _ => None,
        }
    }

    /// Serializes the PDU body, without the header.
    pub fn marshal(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = BytesMut::new();
        match self {
            Pdu::BindReceiver(b) | Pdu::BindTransmitter(b) | Pdu::BindTransceiver(b) => {
                b.marshal(&mut buf)
            }
            Pdu::BindReceiverResp(r)
            | Pdu::BindTransmitterResp(r)
            | Pdu::BindTransceiverResp(r) => r.marshal(&mut buf),
            Pdu::QuerySm(q) => q.marshal(&mut buf),
            Pdu::QuerySmResp(q) => q.marshal(&mut buf)?,
            Pdu::SubmitSm(s) => s.marshal(&mut buf)?,
            Pdu::SubmitSmResp(s) => s.marshal(&mut buf),
            Pdu::DeliverSm(d) => d.marshal(&mut buf)?,
            Pdu::DeliverSmResp(d) => d.marshal(&mut buf),
            Pdu::Unbind
            | Pdu::UnbindResp
            | Pdu::EnquireLink
            | Pdu::EnquireLinkResp
            | Pdu::GenericNack => {}
            unsupported => return Err(CodecError::Unsupported(unsupported.command_id())),
        }
        Ok(buf.to_vec())
    }

    /// Deserializes a PDU body for the given command.
    pub fn unmarshal(id: CommandId, body: &[u8]) -> Result<Pdu, CodecError> {
        match id {
            CommandId::BindReceiver => Bind::unmarshal(body).map(Pdu::BindReceiver),
            CommandId::BindReceiverResp => BindResp::unmarshal(body).map(Pdu::BindReceiverResp),
            CommandId::BindTransmitter => Bind::unmarshal(body).map(Pdu::BindTransmitter),
            CommandId::BindTransmitterResp => {
                BindResp::unmarshal(body).map(Pdu::BindTransmitterResp)
            }
            CommandId::BindTransceiver => Bind::unmarshal(body).map(Pdu::BindTransceiver),
            CommandId::BindTransceiverResp => {
                BindResp::unmarshal(body).map(Pdu::BindTransceiverResp)
            }
            CommandId::QuerySm => QuerySm::unmarshal(body).map(Pdu::QuerySm),
            CommandId::QuerySmResp => QuerySmResp::unmarshal(body).map(Pdu::QuerySmResp),
            CommandId::SubmitSm => SubmitSm::unmarshal(body).map(Pdu::SubmitSm),
            CommandId::SubmitSmResp => SubmitSmResp::unmarshal(body).map(Pdu::SubmitSmResp),
            CommandId::DeliverSm => DeliverSm::unmarshal(body).map(Pdu::DeliverSm),
            CommandId::DeliverSmResp => DeliverSmResp::unmarshal(body).map(Pdu::DeliverSmResp),
            CommandId::Unbind => Ok(Pdu::Unbind),
            CommandId::UnbindResp => Ok(Pdu::UnbindResp),
            CommandId::EnquireLink => Ok(Pdu::EnquireLink),
            CommandId::EnquireLinkResp => Ok(Pdu::EnquireLinkResp),
            CommandId::GenericNack => Ok(Pdu::GenericNack),
            unsupported => Err(CodecError::Unsupported(unsupported)),
        }
    }
}

/// Splits a short message into its user data header and content.
pub fn separate_udh(content: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
    if content.is_empty() {
        return Err(CodecError::InvalidStringLength("udh"));
    }
    let l = content[0] as usize;
    if l >= content.len() {
        return Err(CodecError::InvalidStringLength("udh"));
    }
    Ok((&content[..l + 1], &content[l + 1..]))
}

/// Appends a time field in the absolute layout: formatted string plus the
/// null terminator, or a lone terminator for the absent time.
pub(crate) fn write_time(
    t: &Option<DateTime<FixedOffset>>,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    if let Some(t) = t {
        let s = datetime::format(Layout::Absolute, t)?;
        buf.extend_from_slice(s.as_bytes());
    }
    buf.put_u8(0);
    Ok(())
}

/// Marshals the `c-string + optional TLVs` response body shape shared by
/// the bind responses and `submit_sm_resp`.
pub(crate) fn cstring_opts_marshal(s: &str, opts: &Option<Options>, buf: &mut BytesMut) {
    buf.extend_from_slice(s.as_bytes());
    buf.put_u8(0);
    if let Some(opts) = opts {
        opts.marshal(buf);
    }
}

/// Inverse of [`cstring_opts_marshal`]. An empty body is tolerated and
/// yields an empty string with no options.
pub(crate) fn cstring_opts_unmarshal(
    body: &[u8],
    field: &'static str,
) -> Result<(String, Option<Options>), CodecError> {
    if body.is_empty() {
        return Ok((String::new(), None));
    }
    let end = body
        .iter()
        .position(|&b| b == 0)
        .ok_or(CodecError::InvalidCStringLength(field))?;
    let s = String::from_utf8(body[..end].to_vec())
        .map_err(|_| CodecError::InvalidUtf8(field))?;
    let rest = &body[end + 1..];
    let opts = if rest.is_empty() {
        None
    } else {
        Some(Options::unmarshal(rest)?)
    };
    Ok((s, opts))
}
