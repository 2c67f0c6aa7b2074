use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use ndarray::Array2;
use serde::Serialize;

use super::error::{Result, SpectrogramError};

// ---------------------------------------------------------------------------
// HeaderValue – a single FITS-like header card value
// ---------------------------------------------------------------------------

/// A dynamically-typed header value, mirroring the FITS card value types.
/// `Ord` so headers and search records can live in ordered collections.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// Header-like mapping extracted from a FITS primary HDU or supplied by the caller.
pub type Header = BTreeMap<String, HeaderValue>;

impl Eq for HeaderValue {}

impl PartialOrd for HeaderValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeaderValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use HeaderValue::*;
        fn discriminant(v: &HeaderValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::String(s) => write!(f, "{s}"),
            HeaderValue::Integer(i) => write!(f, "{i}"),
            HeaderValue::Float(v) => write!(f, "{v}"),
            HeaderValue::Bool(b) => write!(f, "{b}"),
            HeaderValue::Null => write!(f, "<null>"),
        }
    }
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Integer(i) => Some(*i as f64),
            HeaderValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Integer(i) => Some(*i),
            HeaderValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            HeaderValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text content with surrounding blanks removed; `None` for non-strings
    /// and for strings that are empty after trimming.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::String(s) if !s.trim().is_empty() => Some(s.trim()),
            _ => None,
        }
    }

    /// Whether the value carries no usable content (null or blank string).
    pub fn is_blank(&self) -> bool {
        match self {
            HeaderValue::Null => true,
            HeaderValue::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::String(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::String(s)
    }
}

impl From<i64> for HeaderValue {
    fn from(i: i64) -> Self {
        HeaderValue::Integer(i)
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Float(v)
    }
}

impl From<bool> for HeaderValue {
    fn from(b: bool) -> Self {
        HeaderValue::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// Units and locations
// ---------------------------------------------------------------------------

/// Physical unit of the intensity values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataUnit {
    /// Raw receiver counts (e-CALLISTO "digits", RSTN analyser bytes).
    Digits,
    Decibel,
    /// Solar flux units.
    Sfu,
    /// Spectral power density, V²/Hz.
    VoltsSquaredPerHertz,
    /// Sentinel for sources that do not declare a unit.
    Dimensionless,
}

impl fmt::Display for DataUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataUnit::Digits => "digits",
            DataUnit::Decibel => "dB",
            DataUnit::Sfu => "sfu",
            DataUnit::VoltsSquaredPerHertz => "V**2/Hz",
            DataUnit::Dimensionless => "",
        };
        write!(f, "{s}")
    }
}

/// Geodetic position of a ground station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObservatoryLocation {
    /// Degrees, north positive.
    pub latitude_deg: f64,
    /// Degrees, east positive.
    pub longitude_deg: f64,
    /// Metres above the WGS84 ellipsoid.
    pub height_m: f64,
}

impl ObservatoryLocation {
    const WGS84_A: f64 = 6_378_137.0;
    const WGS84_F: f64 = 1.0 / 298.257_223_563;

    /// Earth-centred, earth-fixed coordinates in metres on the WGS84 ellipsoid.
    pub fn geocentric(&self) -> [f64; 3] {
        let lat = self.latitude_deg.to_radians();
        let lon = self.longitude_deg.to_radians();
        let e2 = Self::WGS84_F * (2.0 - Self::WGS84_F);
        let n = Self::WGS84_A / (1.0 - e2 * lat.sin().powi(2)).sqrt();
        [
            (n + self.height_m) * lat.cos() * lon.cos(),
            (n + self.height_m) * lat.cos() * lon.sin(),
            (n * (1.0 - e2) + self.height_m) * lat.sin(),
        ]
    }
}

/// Closed time interval covered by a spectrogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

// ---------------------------------------------------------------------------
// Spectrogram – the canonical time–frequency–intensity record
// ---------------------------------------------------------------------------

/// Identity and interpretation metadata of a spectrogram.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrogramMeta {
    pub observatory: String,
    pub instrument: String,
    pub detector: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub unit: DataUnit,
    /// Background already subtracted from the data, one value per frequency.
    pub background: Option<Vec<f64>>,
    pub polarisation: Option<String>,
    pub location: Option<ObservatoryLocation>,
    /// Source header cards worth keeping for scientific interpretation.
    pub extra: Header,
}

impl SpectrogramMeta {
    pub fn new(
        observatory: impl Into<String>,
        instrument: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        unit: DataUnit,
    ) -> Self {
        let instrument = instrument.into();
        SpectrogramMeta {
            observatory: observatory.into(),
            detector: instrument.clone(),
            instrument,
            start_time,
            end_time,
            unit,
            background: None,
            polarisation: None,
            location: None,
            extra: Header::new(),
        }
    }

    pub fn with_detector(mut self, detector: impl Into<String>) -> Self {
        self.detector = detector.into();
        self
    }
}

/// A normalised spectrogram: intensities indexed `(frequency, time)` plus axes.
///
/// Spectrograms are immutable once built. Those returned by the factory or by
/// a join always carry a non-empty observatory and instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    data: Array2<f64>,
    times: Vec<DateTime<Utc>>,
    frequencies: Vec<f64>,
    meta: SpectrogramMeta,
}

impl Spectrogram {
    /// Build a spectrogram, checking the shape and ordering invariants.
    ///
    /// `frequencies` are in MHz, one per data row; `times` one per column and
    /// non-decreasing.
    pub fn new(
        data: Array2<f64>,
        times: Vec<DateTime<Utc>>,
        frequencies: Vec<f64>,
        meta: SpectrogramMeta,
    ) -> Result<Self> {
        let (n_freq, n_time) = data.dim();
        if frequencies.is_empty() {
            return Err(malformed("frequency axis is empty"));
        }
        if times.is_empty() {
            return Err(malformed("time axis is empty"));
        }
        if n_freq != frequencies.len() || n_time != times.len() {
            return Err(malformed(format!(
                "data shape ({n_freq}, {n_time}) does not match axes ({}, {})",
                frequencies.len(),
                times.len()
            )));
        }
        if let Some(i) = times.windows(2).position(|w| w[1] < w[0]) {
            return Err(malformed(format!(
                "time axis decreases at column {}",
                i + 1
            )));
        }
        if meta.start_time > meta.end_time {
            return Err(malformed(format!(
                "start time {} is after end time {}",
                meta.start_time, meta.end_time
            )));
        }
        if meta.instrument.trim().is_empty() {
            return Err(malformed("instrument is empty"));
        }
        Ok(Spectrogram {
            data,
            times,
            frequencies,
            meta,
        })
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    /// Frequency axis in MHz.
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn meta(&self) -> &SpectrogramMeta {
        &self.meta
    }

    pub fn observatory(&self) -> &str {
        &self.meta.observatory
    }

    pub fn instrument(&self) -> &str {
        &self.meta.instrument
    }

    pub fn detector(&self) -> &str {
        &self.meta.detector
    }

    pub fn unit(&self) -> DataUnit {
        self.meta.unit
    }

    /// `(n_frequencies, n_times)`.
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange {
            start: self.meta.start_time,
            end: self.meta.end_time,
        }
    }

    /// Lowest and highest frequency in MHz.
    pub fn frequency_range(&self) -> (f64, f64) {
        self.frequencies
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &f| {
                (lo.min(f), hi.max(f))
            })
    }

    /// Typical spacing between consecutive time samples (median step).
    /// `None` with fewer than two samples.
    pub fn sample_rate_hint(&self) -> Option<Duration> {
        if self.times.len() < 2 {
            return None;
        }
        let mut steps: Vec<Duration> = self.times.windows(2).map(|w| w[1] - w[0]).collect();
        steps.sort();
        Some(steps[steps.len() / 2])
    }

    /// Consume the spectrogram, handing back its parts.
    pub fn into_parts(self) -> (Array2<f64>, Vec<DateTime<Utc>>, Vec<f64>, SpectrogramMeta) {
        (self.data, self.times, self.frequencies, self.meta)
    }

    /// Fill an empty observatory with the dispatching source's default.
    pub(crate) fn backfill_observatory(&mut self, fallback: &str) -> bool {
        if self.meta.observatory.trim().is_empty() {
            self.meta.observatory = fallback.to_string();
            true
        } else {
            false
        }
    }
}

impl fmt::Display for Spectrogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lo, hi) = self.frequency_range();
        write!(
            f,
            "<Spectrogram {}, {}, {} {lo:.3} MHz - {hi:.3} MHz, {} to {}>",
            self.meta.observatory.to_uppercase(),
            self.meta.instrument.to_uppercase(),
            self.meta.detector.to_uppercase(),
            self.meta.start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.meta.end_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }
}

fn malformed(reason: impl Into<String>) -> SpectrogramError {
    SpectrogramError::malformed("spectrogram", reason)
}
