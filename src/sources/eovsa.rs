//! Expanded Owens Valley Solar Array (EOVSA) total-power spectrograms.
//!
//! Frequencies arrive in GHz (`sfreq`), sample times as a Modified Julian Day
//! (`mjd`) plus milliseconds of day (`time`). Files identify themselves through
//! `TELESCOP`.

use super::common::{self, FREQUENCY_AXIS, TIME_AXIS};
use crate::data::error::Result;
use crate::data::loader::RawSpectrogram;
use crate::data::model::{DataUnit, Spectrogram, SpectrogramMeta};
use crate::data::registry::{Detection, RegistryEntry, SourceParser};
use crate::data::time;

pub const EOVSA: &str = "EOVSA";
const OBSERVATORY: &str = "Owens Valley";
const MHZ_PER_GHZ: f64 = 1000.0;

pub fn entry() -> RegistryEntry {
    RegistryEntry::new(
        Detection {
            instrument: is_eovsa,
            telescope: is_eovsa,
            signature: Detection::never_raw,
        },
        EovsaParser,
    )
}

fn is_eovsa(value: &str) -> bool {
    value.eq_ignore_ascii_case(EOVSA)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EovsaParser;

impl SourceParser for EovsaParser {
    fn name(&self) -> &'static str {
        EOVSA
    }

    fn default_observatory(&self) -> &'static str {
        OBSERVATORY
    }

    fn parse(&self, raw: RawSpectrogram) -> Result<Spectrogram> {
        let start = common::header_timestamp(&raw, "DATE_OBS")?;
        let end = common::header_timestamp(&raw, "DATE_END")?;
        let frequencies = common::axis(&raw, "sfreq", FREQUENCY_AXIS, MHZ_PER_GHZ)?;

        let times = match (raw.column("mjd"), raw.column("time")) {
            (Some(days), Some(millis)) => {
                if days.len() != millis.len() {
                    return Err(raw.malformed(format!(
                        "mjd has {} entries but time has {}",
                        days.len(),
                        millis.len()
                    )));
                }
                days.iter()
                    .zip(millis)
                    .enumerate()
                    .map(|(i, (&d, &ms))| {
                        time::from_mjd(d, ms)
                            .ok_or_else(|| raw.malformed(format!("mjd[{i}] out of range")))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            _ => common::absolute_times(&raw, start, &common::axis(&raw, "TIME", TIME_AXIS, 1.0)?)?,
        };

        let mut meta = SpectrogramMeta::new(OBSERVATORY, EOVSA, start, end, DataUnit::Sfu);
        meta.polarisation = raw.text("POLARIZA").map(str::to_string);

        let source = raw.source;
        Spectrogram::new(raw.data, times, frequencies, meta).map_err(|e| e.with_input(&source))
    }
}
