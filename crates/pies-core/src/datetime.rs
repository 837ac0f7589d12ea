//! Split/merge between wire-format timestamps and the separate date and time
//! columns the store keeps.
//!
//! A wire event carries either a bare date (`start_date`) or a full RFC 3339
//! timestamp (`start_datetime`). Storage always splits these into a date
//! string plus an optional time string; the presence of a time component is
//! what distinguishes a full timestamp from an all-day date. Times are
//! normalised to UTC and stored without a timezone suffix.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::{Error, Result};

const DATE_FMT: &str = "%Y-%m-%d";
// `%.f` renders fractional seconds only when non-zero, so a time without
// milliseconds round-trips byte-for-byte.
const TIME_FMT: &str = "%H:%M:%S%.f";

/// A date column value plus an optional time column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDateTime {
  pub date: String,
  pub time: Option<String>,
}

impl SplitDateTime {
  /// Comparable representation; an all-day date sorts as midnight.
  pub fn as_instant(&self) -> Result<(NaiveDate, NaiveTime)> {
    let date = parse_date(&self.date)?;
    let time = match &self.time {
      Some(t) => parse_time(t)?,
      None => NaiveTime::MIN,
    };
    Ok((date, time))
  }
}

/// Split an RFC 3339 timestamp into UTC date and time strings. Any timezone
/// offset on the input is applied and then stripped.
///
/// Milliseconds are the finest stored granularity; finer input is rejected
/// here, on the write path, rather than silently truncated or left to fail
/// on read-back.
pub fn split_datetime(s: &str) -> Result<SplitDateTime> {
  let dt: DateTime<Utc> = DateTime::parse_from_rfc3339(s)
    .map_err(|e| Error::Validation(format!("invalid datetime {s:?}: {e}")))?
    .with_timezone(&Utc);
  if dt.timestamp_subsec_nanos() % 1_000_000 != 0 {
    return Err(Error::Validation(format!(
      "datetime {s:?} has sub-millisecond precision"
    )));
  }
  Ok(SplitDateTime {
    date: dt.format(DATE_FMT).to_string(),
    time: Some(dt.format(TIME_FMT).to_string()),
  })
}

/// Validate a bare `YYYY-MM-DD` date; the time column stays empty.
pub fn split_date(s: &str) -> Result<SplitDateTime> {
  let date = parse_date(s)?;
  Ok(SplitDateTime {
    date: date.format(DATE_FMT).to_string(),
    time: None,
  })
}

/// Merge stored date and time columns back into a wire value: a full RFC 3339
/// timestamp when a time is present, a bare date otherwise.
pub fn merge(date: &str, time: Option<&str>) -> Result<String> {
  let d = parse_date(date)?;
  match time {
    Some(t) => {
      let t = parse_time(t)?;
      let dt = d.and_time(t).and_utc();
      Ok(dt.format("%Y-%m-%dT%H:%M:%S%.fZ").to_string())
    }
    None => Ok(d.format(DATE_FMT).to_string()),
  }
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FMT)
    .map_err(|e| Error::Validation(format!("invalid date {s:?}: {e}")))
}

/// Parse a stored time string. Accepts `HH:MM`, `HH:MM:SS` and
/// `HH:MM:SS.mmm`; out-of-range fields are rejected, never truncated.
pub fn parse_time(s: &str) -> Result<NaiveTime> {
  for fmt in ["%H:%M:%S%.3f", "%H:%M:%S", "%H:%M"] {
    if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
      return Ok(t);
    }
  }
  Err(Error::Validation(format!("invalid time {s:?}")))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
