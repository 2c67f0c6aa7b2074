//! Radio Solar Telescope Network (RSTN) swept-frequency spectrographs.
//!
//! `.srs` files (optionally gzipped) are a sequence of 826-byte records: a 24-byte header followed
//! by two 401-byte sweeps, band A (25–75 MHz) and band B (75–180 MHz).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{NaiveDate, TimeZone, Utc};
use flate2::read::GzDecoder;
use ndarray::Array2;

use super::common::{self, linspace, FREQUENCY_AXIS, TIME_AXIS};
use crate::data::error::{Result, SpectrogramError};
use crate::data::loader::RawSpectrogram;
use crate::data::model::{DataUnit, Header, HeaderValue, Spectrogram, SpectrogramMeta};
use crate::data::registry::{Detection, RegistryEntry, SourceParser};

pub const RSTN: &str = "RSTN";

const RECORD_LEN: usize = 826;
const HEADER_LEN: usize = 24;
const CHANNELS_PER_BAND: usize = 401;
const CHANNELS: usize = 2 * CHANNELS_PER_BAND;

pub fn entry() -> RegistryEntry {
    RegistryEntry::new(
        Detection {
            instrument: is_rstn,
            telescope: Detection::never_str,
            signature: has_srs_name,
        },
        RstnParser,
    )
}

fn is_rstn(value: &str) -> bool {
    value.eq_ignore_ascii_case(RSTN)
}

fn has_srs_name(raw: &RawSpectrogram) -> bool {
    let name = raw.file_name_lower();
    name.ends_with(".srs") || name.ends_with(".srs.gz")
}

/// Station name for an SRS site number.
pub fn site_name(site: u8) -> Option<&'static str> {
    match site {
        1 => Some("Palehua"),
        2 => Some("Holloman"),
        3 => Some("Learmonth"),
        4 => Some("San Vito"),
        _ => None,
    }
}

/// Channel frequencies in MHz: band A then band B.
pub fn band_frequencies() -> Vec<f64> {
    let mut freqs = linspace(25.0, 75.0, CHANNELS_PER_BAND);
    freqs.extend(linspace(75.0, 180.0, CHANNELS_PER_BAND));
    freqs
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RstnParser;

impl SourceParser for RstnParser {
    fn name(&self) -> &'static str {
        RSTN
    }

    fn default_observatory(&self) -> &'static str {
        RSTN
    }

    fn parse(&self, raw: RawSpectrogram) -> Result<Spectrogram> {
        if raw.data.nrows() != CHANNELS {
            return Err(raw.malformed(format!(
                "expected {CHANNELS} channels, data block has {}",
                raw.data.nrows()
            )));
        }
        let frequencies = match raw.column("FREQUENCY") {
            Some(_) => common::axis(&raw, "FREQUENCY", FREQUENCY_AXIS, 1.0)?,
            None => band_frequencies(),
        };
        let start = common::header_time(&raw, "DATE-OBS", "TIME-OBS")?;
        let times = common::absolute_times(&raw, start, &common::axis(&raw, "TIME", TIME_AXIS, 1.0)?)?;
        let end = times.last().copied().unwrap_or(start);

        let observatory = raw
            .text("OBSERVAT")
            .map(str::to_string)
            .or_else(|| {
                raw.card("SITE")
                    .and_then(HeaderValue::as_i64)
                    .and_then(|s| u8::try_from(s).ok())
                    .and_then(site_name)
                    .map(str::to_string)
            })
            .unwrap_or_default();
        let meta = SpectrogramMeta::new(observatory, RSTN, start, end, DataUnit::Digits);

        let source = raw.source;
        Spectrogram::new(raw.data, times, frequencies, meta).map_err(|e| e.with_input(&source))
    }
}

// ---------------------------------------------------------------------------
// SRS reader
// ---------------------------------------------------------------------------

/// Byte layout of one record header (offsets into the record):
///
/// | bytes  | field                                   |
/// |--------|-----------------------------------------|
/// | 0–5    | year (2 digits), month, day, h, m, s    |
/// | 6      | site number                             |
/// | 7      | number of bands                         |
/// | 8–15   | band A: start/end MHz, byte count (u16 BE), ref level, attenuation |
/// | 16–23  | band B: as band A                       |
///
/// Names ending in `.gz` are gunzipped first.
pub fn read_srs(path: &Path) -> Result<RawSpectrogram> {
    let source = path.display().to_string();
    let is_gzip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    let bytes = if is_gzip {
        let file = File::open(path)?;
        let mut bytes = Vec::new();
        GzDecoder::new(BufReader::new(file))
            .read_to_end(&mut bytes)
            .map_err(|e| SpectrogramError::malformed(&source, format!("invalid gzip stream: {e}")))?;
        bytes
    } else {
        std::fs::read(path)?
    };
    parse_srs(&bytes, &source)
}

pub(crate) fn parse_srs(bytes: &[u8], source: &str) -> Result<RawSpectrogram> {
    if bytes.is_empty() || bytes.len() % RECORD_LEN != 0 {
        return Err(SpectrogramError::malformed(
            source,
            format!("{} bytes is not a whole number of {RECORD_LEN}-byte records", bytes.len()),
        ));
    }

    let n_records = bytes.len() / RECORD_LEN;
    let mut data = Array2::zeros((CHANNELS, n_records));
    let mut stamps = Vec::with_capacity(n_records);
    for (i, record) in bytes.chunks_exact(RECORD_LEN).enumerate() {
        let [yy, month, day, hour, minute, second] = [
            record[0], record[1], record[2], record[3], record[4], record[5],
        ];
        let stamp = NaiveDate::from_ymd_opt(2000 + i32::from(yy), month.into(), day.into())
            .and_then(|d| d.and_hms_opt(hour.into(), minute.into(), second.into()))
            .ok_or_else(|| {
                SpectrogramError::malformed(
                    source,
                    format!("record {i} has an invalid timestamp {yy:02}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"),
                )
            })?;
        stamps.push(Utc.from_utc_datetime(&stamp));
        for (ch, &value) in record[HEADER_LEN..].iter().enumerate() {
            data[[ch, i]] = f64::from(value);
        }
    }

    let first = stamps[0];
    let site = bytes[6];
    let mut header = Header::new();
    header.insert("INSTRUME".into(), RSTN.into());
    header.insert("SITE".into(), i64::from(site).into());
    if let Some(name) = site_name(site) {
        header.insert("OBSERVAT".into(), name.into());
    }
    header.insert("DATE-OBS".into(), first.format("%Y-%m-%d").to_string().into());
    header.insert("TIME-OBS".into(), first.format("%H:%M:%S").to_string().into());
    for (band, offset) in [("A", 8), ("B", 16)] {
        let word = |at: usize| i64::from(u16::from_be_bytes([bytes[offset + at], bytes[offset + at + 1]]));
        header.insert(format!("FSTART_{band}"), word(0).into());
        header.insert(format!("FEND_{band}"), word(2).into());
        header.insert(format!("REFLEV_{band}"), i64::from(bytes[offset + 6]).into());
        header.insert(format!("ATTEN_{band}"), i64::from(bytes[offset + 7]).into());
    }

    let offsets: Vec<f64> = stamps
        .iter()
        .map(|t| (*t - first).num_milliseconds() as f64 / 1000.0)
        .collect();

    Ok(RawSpectrogram {
        source: source.to_string(),
        file_name: None,
        header,
        data,
        columns: [("TIME".to_string(), offsets)].into_iter().collect(),
    })
}
