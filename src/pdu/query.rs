//! `query_sm` and its response.

use std::io::Cursor;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, FixedOffset};

use crate::codec::{put_cstring, read_cstring, read_u8, CodecError};
use crate::pdu::write_time;

/// Body of `query_sm`: asks the SMSC for the state of a previously
/// submitted message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySm {
    pub message_id: String,
    pub source_addr_ton: u8,
    pub source_addr_npi: u8,
    pub source_addr: String,
}

impl QuerySm {
    /// Creates the matching response for this query.
    pub fn response(
        &self,
        final_date: Option<DateTime<FixedOffset>>,
        message_state: u8,
        error_code: u8,
    ) -> QuerySmResp {
        QuerySmResp {
            message_id: self.message_id.clone(),
            final_date,
            message_state,
            error_code,
        }
    }

    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        put_cstring(buf, &self.message_id);
        buf.put_u8(self.source_addr_ton);
        buf.put_u8(self.source_addr_npi);
        put_cstring(buf, &self.source_addr);
    }

    pub(crate) fn unmarshal(body: &[u8]) -> Result<Self, CodecError> {
        if body.len() < 6 {
            return Err(CodecError::BodyTooShort("query_sm"));
        }
        let mut cur = Cursor::new(body);
        Ok(QuerySm {
            message_id: read_cstring(&mut cur, 65, "message_id")?,
            source_addr_ton: read_u8(&mut cur, "source_addr_ton")?,
            source_addr_npi: read_u8(&mut cur, "source_addr_npi")?,
            source_addr: read_cstring(&mut cur, 21, "source_addr")?,
        })
    }
}

/// Body of `query_sm_resp`. `final_date` uses the absolute time layout and
/// is absent while the message is still in transit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySmResp {
    pub message_id: String,
    pub final_date: Option<DateTime<FixedOffset>>,
    pub message_state: u8,
    pub error_code: u8,
}

impl QuerySmResp {
    pub(crate) fn marshal(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        put_cstring(buf, &self.message_id);
        write_time(&self.final_date, buf)?;
        buf.put_u8(self.message_state);
        buf.put_u8(self.error_code);
        Ok(())
    }

    pub(crate) fn unmarshal(body: &[u8]) -> Result<Self, CodecError> {
        if body.len() < 6 {
            return Err(CodecError::BodyTooShort("query_sm_resp"));
        }
        let mut cur = Cursor::new(body);
        let message_id = read_cstring(&mut cur, 65, "message_id")?;
        let final_date = read_cstring(&mut cur, 17, "final_date")?;
        let final_date = crate::datetime::parse(final_date.as_bytes())?;
        Ok(QuerySmResp {
            message_id,
            final_date,
            message_state: read_u8(&mut cur, "message_state")?,
            error_code: read_u8(&mut cur, "error_code")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_sm_canonical_bytes() {
        // 7465737400|01|01|6173646600
        let body: &[u8] = &[
            0x74, 0x65, 0x73, 0x74, 0x00, 0x01, 0x01, 0x61, 0x73, 0x64, 0x66, 0x00,
        ];
        let q = QuerySm::unmarshal(body).unwrap();
        assert_eq!(
            q,
            QuerySm {
                message_id: "test".into(),
                source_addr_ton: 1,
                source_addr_npi: 1,
                source_addr: "asdf".into(),
            }
        );
        let mut buf = BytesMut::new();
        q.marshal(&mut buf);
        assert_eq!(&buf[..], body);
    }

    #[test]
    fn query_sm_rejects_short_body() {
        assert!(matches!(
            QuerySm::unmarshal(&[0, 1, 1]),
            Err(CodecError::BodyTooShort("query_sm"))
        ));
    }

    #[test]
    fn query_sm_resp_roundtrip_without_date() {
        let resp = QuerySmResp {
            message_id: "msg1".into(),
            final_date: None,
            message_state: 2,
            error_code: 0,
        };
        let mut buf = BytesMut::new();
        resp.marshal(&mut buf).unwrap();
        assert_eq!(&buf[..], b"msg1\0\0\x02\x00");
        assert_eq!(QuerySmResp::unmarshal(&buf).unwrap(), resp);
    }

    #[test]
    fn query_sm_resp_roundtrip_with_date() {
        use chrono::TimeZone;
        let date = chrono::FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2016, 10, 3, 21, 12, 36)
            .unwrap();
        let resp = QuerySmResp {
            message_id: "msg1".into(),
            final_date: Some(date),
            message_state: 6,
            error_code: 1,
        };
        let mut buf = BytesMut::new();
        resp.marshal(&mut buf).unwrap();
        assert_eq!(QuerySmResp::unmarshal(&buf).unwrap(), resp);
    }
}
