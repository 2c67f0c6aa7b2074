//! WIND/WAVES one-minute averaged RAD1 and RAD2 receiver spectra.
//!
//! The daily arrays come from IDL save files (`YYYYMMDD.R1` / `.R2`), which are
//! decoded outside this crate and handed in as data/header pairs. Each array
//! has 256 channel rows and one column per minute, plus a trailing column with
//! the background already subtracted from the data.

use chrono::Duration;

use super::common::{self, linspace};
use crate::data::error::Result;
use crate::data::loader::RawSpectrogram;
use crate::data::model::{DataUnit, Spectrogram, SpectrogramMeta};
use crate::data::registry::{Detection, RegistryEntry, SourceParser};

pub const WAVES: &str = "WAVES";
const OBSERVATORY: &str = "WIND";
const CHANNELS: usize = 256;
const MINUTES_PER_DAY: usize = 1440;

pub fn entry() -> RegistryEntry {
    RegistryEntry::new(
        Detection {
            instrument: is_waves,
            telescope: Detection::never_str,
            signature: has_receiver_extension,
        },
        WavesParser,
    )
}

fn is_waves(value: &str) -> bool {
    value.eq_ignore_ascii_case(WAVES)
}

fn has_receiver_extension(raw: &RawSpectrogram) -> bool {
    let name = raw.file_name_lower();
    name.ends_with(".r1") || name.ends_with(".r2")
}

/// The two WAVES radio receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    Rad1,
    Rad2,
}

impl Receiver {
    /// Receiver from the `DETECTOR` card, falling back to the file extension.
    fn of(raw: &RawSpectrogram) -> Option<Self> {
        let name = raw.file_name_lower();
        match raw.text("DETECTOR").map(str::to_ascii_uppercase).as_deref() {
            Some("RAD1") => Some(Receiver::Rad1),
            Some("RAD2") => Some(Receiver::Rad2),
            _ if name.ends_with(".r1") => Some(Receiver::Rad1),
            _ if name.ends_with(".r2") => Some(Receiver::Rad2),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Receiver::Rad1 => "RAD1",
            Receiver::Rad2 => "RAD2",
        }
    }

    /// Channel frequencies in MHz.
    pub fn frequencies(self) -> Vec<f64> {
        match self {
            Receiver::Rad1 => linspace(0.020, 1.040, CHANNELS),
            Receiver::Rad2 => linspace(1.075, 13.825, CHANNELS),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WavesParser;

impl SourceParser for WavesParser {
    fn name(&self) -> &'static str {
        WAVES
    }

    fn default_observatory(&self) -> &'static str {
        OBSERVATORY
    }

    /// Samples are centred on the half minute; the day ends at 23:59:59.
    fn parse(&self, raw: RawSpectrogram) -> Result<Spectrogram> {
        let receiver = Receiver::of(&raw)
            .ok_or_else(|| raw.malformed("DETECTOR must be RAD1 or RAD2"))?;
        let (rows, cols) = raw.data.dim();
        if rows != CHANNELS {
            return Err(raw.malformed(format!("expected {CHANNELS} channels, data block has {rows}")));
        }
        if cols < 2 {
            return Err(raw.malformed("expected at least one sample column and a background column"));
        }
        if cols - 1 > MINUTES_PER_DAY {
            return Err(raw.malformed(format!(
                "{} sample columns exceed the {MINUTES_PER_DAY} minutes of one day",
                cols - 1
            )));
        }

        let start = common::header_time(&raw, "DATE-OBS", "TIME-OBS")
            .or_else(|_| common::header_timestamp(&raw, "DATE-OBS"))?;
        let end = start
            .checked_add_signed(Duration::seconds(86_399))
            .ok_or_else(|| raw.malformed("DATE-OBS is out of range"))?;
        let offsets: Vec<f64> = (0..cols - 1).map(|i| (i * 60 + 30) as f64).collect();
        let times = common::absolute_times(&raw, start, &offsets)?;

        let mut meta = SpectrogramMeta::new(OBSERVATORY, WAVES, start, end, DataUnit::Dimensionless)
            .with_detector(receiver.label());
        meta.background = Some(raw.data.column(cols - 1).to_vec());
        let data = raw.data.slice(ndarray::s![.., ..cols - 1]).to_owned();

        Spectrogram::new(data, times, receiver.frequencies(), meta)
            .map_err(|e| e.with_input(&raw.source))
    }
}
