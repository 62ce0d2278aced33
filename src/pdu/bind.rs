//! Bind request and response bodies. The transmitter, receiver and
//! transceiver variants share the same wire layout and differ only in
//! command id, so one body type serves all three.

use std::io::Cursor;

use bytes::{BufMut, BytesMut};

use crate::codec::{put_cstring, read_cstring, read_u8, CodecError};
use crate::pdu::tlv::Options;
use crate::pdu::{cstring_opts_marshal, cstring_opts_unmarshal};

/// Body of `bind_transmitter`, `bind_receiver` and `bind_transceiver`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bind {
    /// Identification of the ESME requesting the bind, up to 15 characters.
    pub system_id: String,
    /// Authentication password, up to 8 characters.
    pub password: String,
    /// Categorizes the type of ESME, e.g. "VMS" or "OTA".
    pub system_type: String,
    /// Supported interface version, 0x34 for this crate.
    pub interface_version: u8,
    pub addr_ton: u8,
    pub addr_npi: u8,
    /// Range of SME addresses serviced by the ESME.
    pub address_range: String,
}

impl Bind {
    /// Creates the matching response carrying the responder's system id.
    pub fn response(&self, system_id: &str) -> BindResp {
        BindResp {
            system_id: system_id.to_owned(),
            options: None,
        }
    }

    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        put_cstring(buf, &self.system_id);
        put_cstring(buf, &self.password);
        put_cstring(buf, &self.system_type);
        buf.put_u8(self.interface_version);
        buf.put_u8(self.addr_ton);
        buf.put_u8(self.addr_npi);
        put_cstring(buf, &self.address_range);
    }

    pub(crate) fn unmarshal(body: &[u8]) -> Result<Self, CodecError> {
        if body.len() < 7 {
            return Err(CodecError::BodyTooShort("bind"));
        }
        let mut cur = Cursor::new(body);
        Ok(Bind {
            system_id: read_cstring(&mut cur, 16, "system_id")?,
            password: read_cstring(&mut cur, 9, "password")?,
            system_type: read_cstring(&mut cur, 13, "system_type")?,
            interface_version: read_u8(&mut cur, "interface_version")?,
            addr_ton: read_u8(&mut cur, "addr_ton")?,
            addr_npi: read_u8(&mut cur, "addr_npi")?,
            address_range: read_cstring(&mut cur, 41, "address_range")?,
        })
    }
}

/// Body of the three `bind_*_resp` PDUs: the responder's system id and an
/// optional TLV trailer, typically carrying `sc_interface_version`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindResp {
    pub system_id: String,
    pub options: Option<Options>,
}

impl BindResp {
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = Some(options);
        self
    }

    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        cstring_opts_marshal(&self.system_id, &self.options, buf);
    }

    pub(crate) fn unmarshal(body: &[u8]) -> Result<Self, CodecError> {
        let (system_id, options) = cstring_opts_unmarshal(body, "system_id")?;
        Ok(BindResp { system_id, options })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_roundtrip() {
        let bind = Bind {
            system_id: "test".into(),
            password: "test2".into(),
            addr_ton: 1,
            addr_npi: 1,
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        bind.marshal(&mut buf);
        // system_id | password | system_type | ver ton npi | range
        let expected = b"test\0test2\0\0\x00\x01\x01\0";
        assert_eq!(&buf[..], &expected[..]);
        assert_eq!(Bind::unmarshal(&buf).unwrap(), bind);
    }

    #[test]
    fn bind_rejects_short_body() {
        assert!(matches!(
            Bind::unmarshal(b"\0\0\0"),
            Err(CodecError::BodyTooShort("bind"))
        ));
    }

    #[test]
    fn bind_rejects_overlong_system_id() {
        let mut body = vec![b'a'; 20];
        body.extend_from_slice(b"\0\0\0\x34\x01\x01\0");
        assert!(matches!(
            Bind::unmarshal(&body),
            Err(CodecError::InvalidCStringLength("system_id"))
        ));
    }

    #[test]
    fn bind_resp_with_interface_version_tlv() {
        // From the canonical vector: 7465737400|0210|0001|34
        let body: &[u8] = &[
            0x74, 0x65, 0x73, 0x74, 0x00, 0x02, 0x10, 0x00, 0x01, 0x34,
        ];
        let resp = BindResp::unmarshal(body).unwrap();
        assert_eq!(resp.system_id, "test");
        assert_eq!(
            resp.options.as_ref().and_then(|o| o.sc_interface_version()),
            Some(0x34)
        );

        let mut buf = BytesMut::new();
        resp.marshal(&mut buf);
        assert_eq!(&buf[..], body);
    }

    #[test]
    fn bind_resp_empty_body() {
        let resp = BindResp::unmarshal(b"").unwrap();
        assert_eq!(resp.system_id, "");
        assert!(resp.options.is_none());
    }
}
