//! Parser for the textual delivery receipt carried in `deliver_sm` short
//! messages:
//!
//! `id:I sub:S dlvrd:D submit date:YYMMDDhhmm done date:YYMMDDhhmm
//! stat:DDDDDDD err:E text:...`
//!
//! Keys must appear in exactly this order. Dates also accept seconds and a
//! four digit year. The status code is kept opaque; the standard values are
//! in [`stat`].

use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::codec::CodecError;
use crate::datetime;

/// Standard message states seen in the `stat` field.
pub mod stat {
    pub const ENROUTE: &str = "ENROUTE";
    pub const DELIVERED: &str = "DELIVRD";
    pub const EXPIRED: &str = "EXPIRED";
    pub const DELETED: &str = "DELETED";
    pub const UNDELIVERABLE: &str = "UNDELIV";
    pub const ACCEPTED: &str = "ACCEPTD";
    pub const UNKNOWN: &str = "UNKNOWN";
    pub const REJECTED: &str = "REJECTD";
}

/// Layout used when re-rendering receipt dates.
const DATE_LAYOUT: &str = "%y%m%d%H%M";

/// A parsed delivery receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    /// Message id assigned by the SMSC; UUIDs with dashes are accepted.
    pub id: String,
    /// Number of messages originally submitted.
    pub sub: String,
    /// Number of messages delivered.
    pub dlvrd: String,
    pub submit_date: NaiveDateTime,
    pub done_date: NaiveDateTime,
    /// Opaque 7-character state code, see [`stat`].
    pub stat: String,
    /// Network specific error code.
    pub err: String,
    /// First 20 characters of the original message, free form.
    pub text: String,
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+ ?\w+):([\w\-]+)").expect("receipt regex"))
}

const KEYS: [&str; 7] = ["id", "sub", "dlvrd", "submit date", "done date", "stat", "err"];

impl DeliveryReceipt {
    /// Parses the receipt format defined by SMPP 3.4 appendix B. The
    /// `text:` key terminates the scan and may also be spelled `Text:`.
    pub fn parse(short_message: &str) -> Result<Self, CodecError> {
        let text_at = short_message
            .find("text:")
            .or_else(|| short_message.find("Text:"))
            .ok_or(CodecError::InvalidReceiptFormat)?;

        let head = &short_message[..text_at];
        let mut fields: Vec<&str> = Vec::with_capacity(KEYS.len());
        for (idx, caps) in key_value_re().captures_iter(head).enumerate() {
            let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if idx >= KEYS.len() || key != KEYS[idx] {
                return Err(CodecError::InvalidReceiptFormat);
            }
            fields.push(caps.get(2).map(|m| m.as_str()).unwrap_or_default());
        }
        if fields.len() != KEYS.len() {
            return Err(CodecError::InvalidReceiptFormat);
        }

        Ok(DeliveryReceipt {
            id: fields[0].to_owned(),
            sub: fields[1].to_owned(),
            dlvrd: fields[2].to_owned(),
            submit_date: parse_date(fields[3])?,
            done_date: parse_date(fields[4])?,
            stat: fields[5].to_owned(),
            err: fields[6].to_owned(),
            text: short_message[text_at + 5..].to_owned(),
        })
    }
}

fn parse_date(value: &str) -> Result<NaiveDateTime, CodecError> {
    match datetime::parse(value.as_bytes()) {
        Ok(Some(t)) => Ok(t.naive_local()),
        _ => Err(CodecError::InvalidReceiptFormat),
    }
}

impl fmt::Display for DeliveryReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id:{} sub:{} dlvrd:{} submit date:{} done date:{} stat:{} err:{} text:{}",
            self.id,
            self.sub,
            self.dlvrd,
            self.submit_date.format(DATE_LAYOUT),
            self.done_date.format(DATE_LAYOUT),
            self.stat,
            self.err,
            self.text
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const RECEIPT: &str = "id:a03ea27b-9bb4-4d5e-b87f-3f578ab46153 sub:001 dlvrd:001 \
        submit date:161003211236 done date:161003211236 stat:DELIVRD err:000 text:-";

    #[test]
    fn parses_uuid_receipt() {
        let rec = DeliveryReceipt::parse(RECEIPT).unwrap();
        let date = NaiveDate::from_ymd_opt(2016, 10, 3)
            .unwrap()
            .and_hms_opt(21, 12, 36)
            .unwrap();
        assert_eq!(
            rec,
            DeliveryReceipt {
                id: "a03ea27b-9bb4-4d5e-b87f-3f578ab46153".into(),
                sub: "001".into(),
                dlvrd: "001".into(),
                submit_date: date,
                done_date: date,
                stat: stat::DELIVERED.into(),
                err: "000".into(),
                text: "-".into(),
            }
        );
    }

    #[test]
    fn parses_minute_precision_dates() {
        let rec = DeliveryReceipt::parse(
            "id:1 sub:001 dlvrd:001 submit date:1610032112 done date:1610032113 \
             stat:EXPIRED err:000 Text:hello world",
        )
        .unwrap();
        assert_eq!(rec.submit_date.format("%H%M").to_string(), "2112");
        assert_eq!(rec.stat, stat::EXPIRED);
        assert_eq!(rec.text, "hello world");
    }

    #[test]
    fn rejects_misspelled_key() {
        let input = RECEIPT.replace("sub:", "dfdfsub:");
        assert!(matches!(
            DeliveryReceipt::parse(&input),
            Err(CodecError::InvalidReceiptFormat)
        ));
    }

    #[test]
    fn rejects_misordered_keys() {
        let input = "sub:001 id:1 dlvrd:001 submit date:1610032112 done date:1610032113 \
             stat:DELIVRD err:000 text:-";
        assert!(matches!(
            DeliveryReceipt::parse(input),
            Err(CodecError::InvalidReceiptFormat)
        ));
    }

    #[test]
    fn rejects_missing_text_terminator() {
        assert!(matches!(
            DeliveryReceipt::parse("id:1 sub:001 dlvrd:001"),
            Err(CodecError::InvalidReceiptFormat)
        ));
    }

    #[test]
    fn rejects_missing_key() {
        let input = "id:1 sub:001 submit date:1610032112 done date:1610032113 \
             stat:DELIVRD err:000 text:-";
        assert!(matches!(
            DeliveryReceipt::parse(input),
            Err(CodecError::InvalidReceiptFormat)
        ));
    }

    #[test]
    fn renders_back_to_canonical_form() {
        let rec = DeliveryReceipt::parse(RECEIPT).unwrap();
        assert_eq!(
            rec.to_string(),
            "id:a03ea27b-9bb4-4d5e-b87f-3f578ab46153 sub:001 dlvrd:001 \
             submit date:1610032112 done date:1610032112 stat:DELIVRD err:000 text:-"
        );
    }
}
