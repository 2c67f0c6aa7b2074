//! e-CALLISTO, the international network of solar radio spectrometers.
//!
//! Stations write the primary image as `(frequency, time)` digits, put the
//! `TIME` (seconds from `TIME-OBS`) and `FREQUENCY` (MHz) axes into the first
//! table extension, and record the *station* in `INSTRUME`. Most archived
//! files identify themselves only through the `CONTENT` card or their file
//! name, so detection relies on the signature stage of the fallback chain.

use chrono::NaiveDateTime;

use super::common::{self, FREQUENCY_AXIS, TIME_AXIS};
use crate::data::error::Result;
use crate::data::loader::RawSpectrogram;
use crate::data::model::{DataUnit, HeaderValue, ObservatoryLocation, Spectrogram, SpectrogramMeta};
use crate::data::registry::{Detection, RegistryEntry, SourceParser};

pub const CALLISTO: &str = "e-CALLISTO";

/// Header cards kept verbatim in [`SpectrogramMeta::extra`].
const KEPT_CARDS: [&str; 3] = ["CONTENT", "ORIGIN", "TELESCOP"];

pub fn entry() -> RegistryEntry {
    RegistryEntry::new(
        Detection {
            instrument: is_callisto_instrument,
            telescope: Detection::never_str,
            signature: has_callisto_signature,
        },
        CallistoParser,
    )
}

fn is_callisto_instrument(value: &str) -> bool {
    value.eq_ignore_ascii_case(CALLISTO) || value.eq_ignore_ascii_case("CALLISTO")
}

/// `CONTENT` mentions e-CALLISTO, or the file follows the network's naming scheme.
fn has_callisto_signature(raw: &RawSpectrogram) -> bool {
    raw.text("CONTENT").is_some_and(|c| c.contains(CALLISTO))
        || raw
            .file_name
            .as_deref()
            .and_then(CallistoFileName::parse)
            .is_some()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallistoParser;

impl SourceParser for CallistoParser {
    fn name(&self) -> &'static str {
        CALLISTO
    }

    fn default_observatory(&self) -> &'static str {
        CALLISTO
    }

    /// The station (`INSTRUME`) becomes the observatory and is left empty when
    /// the card is missing.
    fn parse(&self, raw: RawSpectrogram) -> Result<Spectrogram> {
        let start = common::header_time(&raw, "DATE-OBS", "TIME-OBS")?;
        let offsets = common::axis(&raw, "TIME", TIME_AXIS, 1.0)?;
        let frequencies = common::axis(&raw, "FREQUENCY", FREQUENCY_AXIS, 1.0)?;
        let times = common::absolute_times(&raw, start, &offsets)?;
        let end = match common::optional_header_time(&raw, "DATE-END", "TIME-END")? {
            Some(end) => end,
            None => times.last().copied().unwrap_or(start),
        };

        let observatory = raw.text("INSTRUME").unwrap_or("").to_string();
        let mut meta = SpectrogramMeta::new(observatory, CALLISTO, start, end, DataUnit::Digits);
        meta.location = location(&raw);
        for card in KEPT_CARDS {
            if let Some(value) = raw.card(card) {
                meta.extra.insert(card.to_string(), value.clone());
            }
        }

        let source = raw.source;
        Spectrogram::new(raw.data, times, frequencies, meta).map_err(|e| e.with_input(&source))
    }
}

/// Station position from `OBS_LAT`/`OBS_LAC`/`OBS_LON`/`OBS_LOC`/`OBS_ALT`.
fn location(raw: &RawSpectrogram) -> Option<ObservatoryLocation> {
    let lat = raw.number("OBS_LAT")?;
    let lon = raw.number("OBS_LON")?;
    let lat_sign = match raw.text("OBS_LAC")? {
        "S" | "s" => -1.0,
        _ => 1.0,
    };
    let lon_sign = match raw.text("OBS_LOC")? {
        "W" | "w" => -1.0,
        _ => 1.0,
    };
    Some(ObservatoryLocation {
        latitude_deg: lat_sign * lat,
        longitude_deg: lon_sign * lon,
        height_m: raw.card("OBS_ALT").and_then(HeaderValue::as_f64).unwrap_or(0.0),
    })
}

// ---------------------------------------------------------------------------
// File naming scheme
// ---------------------------------------------------------------------------

/// Parsed `{STATION}_{YYYYMMDD}_{HHMMSS}[_{ID}].fit[.gz]` file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallistoFileName {
    pub station: String,
    pub start: NaiveDateTime,
    /// Focus code of the receiver, when present.
    pub id: Option<String>,
}

impl CallistoFileName {
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let without_gz = lower.strip_suffix(".gz").unwrap_or(&lower);
        let stem_len = [".fits", ".fit"]
            .iter()
            .find_map(|ext| without_gz.strip_suffix(ext))?
            .len();
        let stem = &name[..stem_len];

        let parts: Vec<&str> = stem.split('_').collect();
        let n = parts.len();
        let has_id = n >= 4
            && is_digits(parts[n - 3], 8)
            && is_digits(parts[n - 2], 6)
            && !parts[n - 1].is_empty()
            && parts[n - 1].chars().all(|c| c.is_ascii_digit());
        let (station_parts, date, time, id) = if has_id {
            (&parts[..n - 3], parts[n - 3], parts[n - 2], Some(parts[n - 1].to_string()))
        } else if n >= 3 && is_digits(parts[n - 2], 8) && is_digits(parts[n - 1], 6) {
            (&parts[..n - 2], parts[n - 2], parts[n - 1], None)
        } else {
            return None;
        };

        let station = station_parts.join("_");
        if station.is_empty() {
            return None;
        }
        let start = NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M%S").ok()?;
        Some(CallistoFileName { station, start, id })
    }
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.chars().all(|c| c.is_ascii_digit())
}
