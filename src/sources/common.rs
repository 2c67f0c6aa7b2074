//! Axis and timestamp reconstruction shared by the source parsers.

use chrono::{DateTime, Utc};

use crate::data::error::Result;
use crate::data::loader::RawSpectrogram;
use crate::data::time;

/// FITS axis number of the time axis (columns of the data block).
pub const TIME_AXIS: u8 = 1;
/// FITS axis number of the frequency axis (rows of the data block).
pub const FREQUENCY_AXIS: u8 = 2;

/// Required timestamp assembled from a date card and a time-of-day card.
pub fn header_time(raw: &RawSpectrogram, date_key: &str, time_key: &str) -> Result<DateTime<Utc>> {
    optional_header_time(raw, date_key, time_key)?
        .ok_or_else(|| raw.malformed(format!("missing {date_key}/{time_key}")))
}

/// Timestamp from a date card and time-of-day card; `None` when either card is absent.
pub fn optional_header_time(
    raw: &RawSpectrogram,
    date_key: &str,
    time_key: &str,
) -> Result<Option<DateTime<Utc>>> {
    match (raw.text(date_key), raw.text(time_key)) {
        (Some(date), Some(tod)) => time::parse_date_time(date, tod)
            .map(Some)
            .map_err(|e| raw.malformed(format!("{date_key}/{time_key}: {e}"))),
        _ => Ok(None),
    }
}

/// Required ISO-8601 timestamp held in a single card.
pub fn header_timestamp(raw: &RawSpectrogram, key: &str) -> Result<DateTime<Utc>> {
    let value = raw
        .text(key)
        .ok_or_else(|| raw.malformed(format!("missing {key}")))?;
    time::parse_timestamp(value).map_err(|e| raw.malformed(format!("{key}: {e}")))
}

/// Axis values taken from an explicit table column, or else rebuilt from the
/// `CRVALn`/`CDELTn`/`NAXISn` start/step/count triple. Values are multiplied
/// by `scale` to reach the canonical unit.
pub fn axis(raw: &RawSpectrogram, column: &str, axis: u8, scale: f64) -> Result<Vec<f64>> {
    if let Some(values) = raw.column(column) {
        return Ok(values.iter().map(|v| v * scale).collect());
    }

    let start_key = format!("CRVAL{axis}");
    let step_key = format!("CDELT{axis}");
    let count_key = format!("NAXIS{axis}");
    let (Some(start), Some(step), Some(count)) = (
        raw.number(&start_key),
        raw.number(&step_key),
        raw.card(&count_key).and_then(|v| v.as_i64()),
    ) else {
        return Err(raw.malformed(format!(
            "no {column} column and no {start_key}/{step_key}/{count_key} axis descriptor"
        )));
    };
    if count <= 0 {
        return Err(raw.malformed(format!("{count_key} is {count}")));
    }

    let expected = match axis {
        TIME_AXIS => raw.data.ncols(),
        _ => raw.data.nrows(),
    };
    if count as usize != expected {
        return Err(raw.malformed(format!(
            "{count_key} declares {count} samples but the data block has {expected}"
        )));
    }

    Ok((0..count)
        .map(|i| (start + step * i as f64) * scale)
        .collect())
}

/// Absolute timestamps from a start time and per-column offsets in seconds.
pub fn absolute_times(
    raw: &RawSpectrogram,
    start: DateTime<Utc>,
    offsets_s: &[f64],
) -> Result<Vec<DateTime<Utc>>> {
    offsets_s
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            time::offset_seconds(start, s)
                .ok_or_else(|| raw.malformed(format!("time offset [{i}] = {s} s is out of range")))
        })
        .collect()
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Header;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use ndarray::Array2;

    fn raw_with(cards: &[(&str, f64)], shape: (usize, usize)) -> RawSpectrogram {
        let mut header = Header::new();
        for (k, v) in cards {
            header.insert(k.to_string(), (*v).into());
        }
        RawSpectrogram::from_pair(Array2::zeros(shape), header)
    }

    #[test]
    fn test_axis_prefers_column() {
        let raw = raw_with(&[], (2, 1)).with_column("FREQUENCY", vec![1.0, 2.0]);
        assert_eq!(axis(&raw, "FREQUENCY", FREQUENCY_AXIS, 1000.0).unwrap(), vec![1000.0, 2000.0]);
    }

    #[test]
    fn test_axis_from_triple() {
        let raw = raw_with(&[("CRVAL2", 45.0), ("CDELT2", -0.5), ("NAXIS2", 3.0)], (3, 4));
        let freqs = axis(&raw, "FREQUENCY", FREQUENCY_AXIS, 1.0).unwrap();
        assert_eq!(freqs, vec![45.0, 44.5, 44.0]);
    }

    #[test]
    fn test_axis_count_must_match_data() {
        let raw = raw_with(&[("CRVAL1", 0.0), ("CDELT1", 0.25), ("NAXIS1", 5.0)], (3, 4));
        let err = axis(&raw, "TIME", TIME_AXIS, 1.0).unwrap_err();
        assert!(err.to_string().contains("NAXIS1 declares 5"));
    }

    #[test]
    fn test_axis_rejects_zero_count_and_missing_descriptor() {
        let zero = raw_with(&[("CRVAL2", 1.0), ("CDELT2", 1.0), ("NAXIS2", 0.0)], (0, 4));
        assert!(axis(&zero, "FREQUENCY", FREQUENCY_AXIS, 1.0).is_err());
        let missing = raw_with(&[("CRVAL2", 1.0)], (1, 1));
        let err = axis(&missing, "FREQUENCY", FREQUENCY_AXIS, 1.0).unwrap_err();
        assert!(err.to_string().contains("axis descriptor"));
    }

    #[test]
    fn test_absolute_times_reject_unrepresentable_offsets() {
        let raw = raw_with(&[], (1, 2));
        let start = Utc.with_ymd_and_hms(2011, 9, 22, 9, 0, 0).unwrap();
        let times = absolute_times(&raw, start, &[0.0, 0.25]).unwrap();
        assert_eq!(times[1] - times[0], chrono::Duration::milliseconds(250));
        let err = absolute_times(&raw, start, &[0.0, 1e20]).unwrap_err();
        assert!(err.to_string().contains("time offset [1]"));
    }

    #[test]
    fn test_linspace_endpoints() {
        let v = linspace(20.0, 1040.0, 256);
        assert_eq!(v.len(), 256);
        assert_relative_eq!(v[0], 20.0);
        assert_relative_eq!(v[255], 1040.0, epsilon = 1e-9);
        assert_relative_eq!(v[1] - v[0], 4.0, epsilon = 1e-9);
    }
}
