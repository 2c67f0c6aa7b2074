//! Timestamp helpers for the date/time conventions found in source headers.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use hifitime::{Duration as HifiDuration, Epoch, TimeScale, UNIX_REF_EPOCH};

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Parse a header date and time-of-day pair such as `2011/06/07` + `06:24:00.213`.
///
/// Hours of 24 and above roll over into the following day(s); some archived
/// e-CALLISTO files write the end of the last scan as `24:00:00`.
pub fn parse_date_time(date: &str, time: &str) -> Result<DateTime<Utc>, String> {
    let day = parse_date(date)?;
    let (hour, rest) = time
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("'{time}' is not a time of day"))?;
    let hour: i64 = hour
        .trim()
        .parse()
        .ok()
        .filter(|h| *h >= 0)
        .ok_or_else(|| format!("'{time}' has an invalid hour"))?;
    let normalised = format!("{:02}:{rest}", hour % 24);
    let tod = NaiveTime::parse_from_str(&normalised, "%H:%M:%S%.f")
        .map_err(|e| format!("'{time}' is not a time of day: {e}"))?;
    let naive = Duration::try_days(hour / 24)
        .and_then(|days| day.and_time(tod).checked_add_signed(days))
        .ok_or_else(|| format!("'{date} {time}' is out of range"))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Parse an ISO-8601-like timestamp with either a `T` or a blank separator.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim().trim_end_matches('Z');
    match value.split_once(['T', ' ']) {
        Some((date, time)) => parse_date_time(date, time),
        None => parse_date(value).map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN))),
    }
}

fn parse_date(date: &str) -> Result<NaiveDate, String> {
    let date = date.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date, fmt).ok())
        .ok_or_else(|| format!("'{date}' is not a date"))
}

/// Offset a reference time by a (possibly fractional) number of seconds.
/// `None` when the offset is not finite or leaves the representable range.
pub fn offset_seconds(reference: DateTime<Utc>, seconds: f64) -> Option<DateTime<Utc>> {
    let nanos = (seconds * 1e9).round();
    if !nanos.is_finite() || nanos.abs() >= i64::MAX as f64 {
        return None;
    }
    reference.checked_add_signed(Duration::nanoseconds(nanos as i64))
}

/// MJD day numbers beyond this are rejected before reaching `hifitime`.
const MJD_LIMIT: f64 = 1.0e6;

/// Modified Julian Day number plus milliseconds into that day (UTC).
pub fn from_mjd(day: f64, millis: f64) -> Option<DateTime<Utc>> {
    if !day.is_finite() || day.abs() > MJD_LIMIT || !millis.is_finite() {
        return None;
    }
    let midnight = to_utc(Epoch::from_mjd_utc(day.trunc()))?;
    offset_seconds(midnight, millis / 1000.0)
}

/// Convert CDF TT2000 nanoseconds (TT since J2000.0) to UTC.
pub fn from_tt2000(nanos: i64) -> Option<DateTime<Utc>> {
    let j2000 = Epoch::from_gregorian_hms(2000, 1, 1, 12, 0, 0, TimeScale::TT);
    to_utc(j2000 + HifiDuration::from_total_nanoseconds(i128::from(nanos)))
}

/// Leap-second aware conversion from a `hifitime` epoch to a chrono UTC instant.
fn to_utc(epoch: Epoch) -> Option<DateTime<Utc>> {
    let nanos = i64::try_from((epoch.to_duration_in_time_scale(TimeScale::UTC) - UNIX_REF_EPOCH.to_utc_duration()).total_nanoseconds()).ok()?;
    Some(Utc.timestamp_nanos(nanos))
}
