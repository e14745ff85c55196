//! PM filename metadata extraction
//!
//! PM files are named `A<yyyymmdd>.<hhmm><±hhmm>-<hhmm><±hhmm>_<serial>_<suffix>.xml`,
//! for example `A20250827.1800+0530-1815+0530_001-01-64160_NRCELL_DU.xml`.
//! The start time and offset become the record's capture instant; the end
//! time and offset are parsed and validated but carry no further meaning.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use thiserror::Error;

static PM_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"A(\d{8})\.(\d{4})([+-]\d{4})-(\d{4})([+-]\d{4})_(\d{3}-\d{2}-\d{5})_.*\.xml$")
        .unwrap_or_else(|e| unreachable!("PM filename pattern is a valid literal: {e}"))
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilenameError {
    #[error("Unparsable filename '{filename}': {reason}")]
    Unparsable { filename: String, reason: String },
}

/// Metadata carried by a PM filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmFileName {
    pub capture_time: DateTime<FixedOffset>,
    pub serial_number: String,
    pub end_time: NaiveTime,
    pub end_offset: FixedOffset,
}

/// Extract the capture instant and serial number from a PM filename.
///
/// Never substitutes a fallback timestamp: anything that does not match the
/// naming convention, or names an impossible date or time, is rejected.
pub fn extract(filename: &str) -> Result<PmFileName, FilenameError> {
    let unparsable = |reason: &str| FilenameError::Unparsable {
        filename: filename.to_string(),
        reason: reason.to_string(),
    };

    let caps = PM_FILENAME
        .captures(filename)
        .ok_or_else(|| unparsable("does not match the PM naming convention"))?;
    let group = |caps: &Captures<'_>, i: usize| caps.get(i).map_or("", |m| m.as_str()).to_string();

    let date = NaiveDate::parse_from_str(&group(&caps, 1), "%Y%m%d")
        .map_err(|_| unparsable("invalid calendar date"))?;
    let start = parse_hhmm(&group(&caps, 2)).ok_or_else(|| unparsable("invalid start time"))?;
    let start_offset =
        parse_offset(&group(&caps, 3)).ok_or_else(|| unparsable("invalid start UTC offset"))?;
    let end_time = parse_hhmm(&group(&caps, 4)).ok_or_else(|| unparsable("invalid end time"))?;
    let end_offset =
        parse_offset(&group(&caps, 5)).ok_or_else(|| unparsable("invalid end UTC offset"))?;

    let capture_time = start_offset
        .from_local_datetime(&date.and_time(start))
        .single()
        .ok_or_else(|| unparsable("ambiguous capture instant"))?;

    Ok(PmFileName {
        capture_time,
        serial_number: group(&caps, 6),
        end_time,
        end_offset,
    })
}

fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H%M").ok()
}

/// `+HHMM` / `-HHMM` to a fixed offset
fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let (sign, digits) = raw.split_at(1);
    let hours: i32 = digits.get(..2)?.parse().ok()?;
    let minutes: i32 = digits.get(2..)?.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    let seconds = (hours * 60 + minutes) * 60;
    match sign {
        "+" => FixedOffset::east_opt(seconds),
        "-" => FixedOffset::west_opt(seconds),
        _ => None,
    }
}
