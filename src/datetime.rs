//! SMPP date-time codec.
//!
//! Four string layouts exist on the wire: simple minutes `YYMMDDhhmm`,
//! simple seconds `YYMMDDhhmmss` (plus the four-digit-year variant seen in
//! delivery receipts), absolute `YYMMDDhhmmsstnn±` where `t` is tenths of a
//! second and `nn` a quarter-hour UTC offset, and relative
//! `YYMMDDhhmmss000R` which is a delta applied to the current time at parse
//! time. The absent time is the empty string on the wire and `None` here.

use chrono::{
    DateTime, Datelike, Days, Duration, FixedOffset, Months, NaiveDate, TimeZone, Timelike, Utc,
};

use crate::codec::CodecError;

/// Quarter-hour granularity of the absolute layout's UTC offset.
const QUARTER_HOUR_SECS: i32 = 900;

/// SMPP time layout selector for [`format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `YYMMDDhhmmss`
    SimpleSeconds,
    /// `YYMMDDhhmm`
    SimpleMinutes,
    /// `YYMMDDhhmmsstnn[+-]`
    Absolute,
    /// `YYMMDDhhmmss000R`
    Relative,
}

/// Parses an SMPP time string. Empty or single-byte input is the absent
/// time. Relative layouts are anchored to the current time.
pub fn parse(input: &[u8]) -> Result<Option<DateTime<FixedOffset>>, CodecError> {
    match input.len() {
        0 | 1 => Ok(None),
        10 => {
            let (y, mo, d, h, mi) = (
                two_digit_year(input, 0)?,
                digits2(input, 2)?,
                digits2(input, 4)?,
                digits2(input, 6)?,
                digits2(input, 8)?,
            );
            assemble(y, mo, d, h, mi, 0, 0, 0, input).map(Some)
        }
        12 => {
            let (y, mo, d, h, mi, s) = fields12(input, two_digit_year(input, 0)?)?;
            assemble(y, mo, d, h, mi, s, 0, 0, input).map(Some)
        }
        14 => {
            let y = digits2(input, 0)? * 100 + digits2(input, 2)?;
            let (y, mo, d, h, mi, s) = fields12(&input[2..], y as i32)?;
            assemble(y, mo, d, h, mi, s, 0, 0, input).map(Some)
        }
        16 => match input[15] {
            b'R' => parse_relative(input),
            b'+' | b'-' => {
                let (y, mo, d, h, mi, s) = fields12(input, two_digit_year(input, 0)?)?;
                let tenth = digit(input, 12)?;
                let nn = digits2(input, 13)?;
                let mut offset = nn as i32 * QUARTER_HOUR_SECS;
                if input[15] == b'-' {
                    offset = -offset;
                }
                assemble(y, mo, d, h, mi, s, tenth, offset, input).map(Some)
            }
            _ => Err(invalid(input)),
        },
        _ => Err(invalid(input)),
    }
}

/// Formats `t` according to `layout`. The relative layout renders the
/// broken-down difference between `t` and the current time.
pub fn format(layout: Layout, t: &DateTime<FixedOffset>) -> Result<String, CodecError> {
    match layout {
        Layout::SimpleSeconds => Ok(t.format("%y%m%d%H%M%S").to_string()),
        Layout::SimpleMinutes => Ok(t.format("%y%m%d%H%M").to_string()),
        Layout::Absolute => {
            let mut offset = t.offset().local_minus_utc() / QUARTER_HOUR_SECS;
            let sign = if offset < 0 {
                offset = -offset;
                '-'
            } else {
                '+'
            };
            let tenths = t.nanosecond() / 100_000_000;
            Ok(format!(
                "{}{}{:02}{}",
                t.format("%y%m%d%H%M%S"),
                tenths,
                offset,
                sign
            ))
        }
        Layout::Relative => {
            let now = Utc::now().with_timezone(t.offset());
            let (y, mo, d, h, mi, s) = diff(t, &now);
            Ok(format!(
                "{y:02}{mo:02}{d:02}{h:02}{mi:02}{s:02}000R"
            ))
        }
    }
}

fn parse_relative(input: &[u8]) -> Result<Option<DateTime<FixedOffset>>, CodecError> {
    let (y, mo, d, h, mi, s) = fields12(input, digits2(input, 0)? as i32)?;
    let now = Utc::now().fixed_offset();
    let t = now
        .checked_add_months(Months::new(y as u32 * 12 + mo))
        .and_then(|t| t.checked_add_days(Days::new(d as u64)))
        .ok_or_else(|| invalid(input))?
        + Duration::hours(h as i64)
        + Duration::minutes(mi as i64)
        + Duration::seconds(s as i64);
    Ok(Some(t))
}

/// Reads `YYMMDDhhmmss` starting at the given slice, with the year already
/// resolved by the caller.
fn fields12(input: &[u8], year: i32) -> Result<(i32, u32, u32, u32, u32, u32), CodecError> {
    Ok((
        year,
        digits2(input, 2)?,
        digits2(input, 4)?,
        digits2(input, 6)?,
        digits2(input, 8)?,
        digits2(input, 10)?,
    ))
}

fn assemble(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    tenth: u32,
    offset_secs: i32,
    input: &[u8],
) -> Result<DateTime<FixedOffset>, CodecError> {
    let zone = FixedOffset::east_opt(offset_secs).ok_or_else(|| invalid(input))?;
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .ok_or_else(|| invalid(input))?;
    let t = zone
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| invalid(input))?;
    Ok(t + Duration::milliseconds(tenth as i64 * 100))
}

/// Two-digit years follow the usual pivot: 00-68 land in the 2000s.
fn two_digit_year(input: &[u8], i: usize) -> Result<i32, CodecError> {
    let yy = digits2(input, i)?;
    Ok(if yy <= 68 { 2000 + yy as i32 } else { 1900 + yy as i32 })
}

fn digit(input: &[u8], i: usize) -> Result<u32, CodecError> {
    match input.get(i) {
        Some(b) if b.is_ascii_digit() => Ok((b - b'0') as u32),
        _ => Err(invalid(input)),
    }
}

fn digits2(input: &[u8], i: usize) -> Result<u32, CodecError> {
    Ok(digit(input, i)? * 10 + digit(input, i + 1)?)
}

fn invalid(input: &[u8]) -> CodecError {
    CodecError::InvalidTimeFormat(String::from_utf8_lossy(input).into_owned())
}

/// Broken-down difference `b - a` in calendar components with negative
/// values carried into the next larger unit.
fn diff(
    a: &DateTime<FixedOffset>,
    b: &DateTime<FixedOffset>,
) -> (i64, i64, i64, i64, i64, i64) {
    let (a, b) = if a > b { (b, a) } else { (a, b) };

    let mut year = b.year() as i64 - a.year() as i64;
    let mut month = b.month() as i64 - a.month() as i64;
    let mut day = b.day() as i64 - a.day() as i64;
    let mut hour = b.hour() as i64 - a.hour() as i64;
    let mut min = b.minute() as i64 - a.minute() as i64;
    let mut sec = b.second() as i64 - a.second() as i64;

    if sec < 0 {
        sec += 60;
        min -= 1;
    }
    if min < 0 {
        min += 60;
        hour -= 1;
    }
    if hour < 0 {
        hour += 24;
        day -= 1;
    }
    if day < 0 {
        day += days_in_month(a.year(), a.month());
        month -= 1;
    }
    if month < 0 {
        month += 12;
        year -= 1;
    }

    (year, month, day, hour, min, sec)
}

fn days_in_month(year: i32, month: u32) -> i64 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = NaiveDate::from_ymd_opt(ny, nm, 1);
    match (first, next) {
        (Some(first), Some(next)) => (next - first).num_days(),
        _ => 30,
    }
}
