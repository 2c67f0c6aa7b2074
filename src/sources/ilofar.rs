//! Irish LOFAR station (I-LOFAR, IE613) beamformed statistics in mode 357.
//!
//! Mode 357 observes three LOFAR receiver modes at once: mode 3 (LBA,
//! 10–90 MHz), mode 5 (HBA, 110–190 MHz) and mode 7 (HBA, 210–250 MHz), 488
//! subbands in all. Data arrive as a data/header pair identified by
//! `INSTRUME = ILOFAR`; the `MODE` and `POLARISATION` cards carry through to the
//! metadata.

use super::common::{self, FREQUENCY_AXIS, TIME_AXIS};
use crate::data::error::Result;
use crate::data::loader::RawSpectrogram;
use crate::data::model::{DataUnit, HeaderValue, Spectrogram, SpectrogramMeta};
use crate::data::registry::{Detection, RegistryEntry, SourceParser};

pub const ILOFAR: &str = "ILOFAR";
const OBSERVATORY: &str = "I-LOFAR";
const MODE: i64 = 357;

/// Subband width at the 200 MHz sampling clock, in MHz.
const SUBBAND_MHZ: f64 = 100.0 / 512.0;

/// `(receiver mode, first subband, last subband)`, every second subband.
const MODE_357_SUBBANDS: [(u8, u32, u32); 3] = [(3, 54, 452), (5, 54, 452), (7, 54, 228)];

pub fn entry() -> RegistryEntry {
    RegistryEntry::new(
        Detection {
            instrument: is_ilofar,
            telescope: is_ilofar,
            signature: Detection::never_raw,
        },
        IlofarParser,
    )
}

fn is_ilofar(value: &str) -> bool {
    value.eq_ignore_ascii_case(ILOFAR) || value.eq_ignore_ascii_case(OBSERVATORY)
}

/// Channel frequencies of a mode-357 observation in MHz, mode 3 first.
pub fn mode_357_frequencies() -> Vec<f64> {
    MODE_357_SUBBANDS
        .iter()
        .flat_map(|&(mode, first, last)| {
            // Nyquist zone 1, 2 or 3 of the 200 MHz clock.
            let zone_start = 100.0 * f64::from((mode - 1) / 2 - 1);
            (first..=last)
                .step_by(2)
                .map(move |sb| zone_start + f64::from(sb) * SUBBAND_MHZ)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IlofarParser;

impl SourceParser for IlofarParser {
    fn name(&self) -> &'static str {
        ILOFAR
    }

    fn default_observatory(&self) -> &'static str {
        OBSERVATORY
    }

    fn parse(&self, raw: RawSpectrogram) -> Result<Spectrogram> {
        if let Some(mode) = raw.card("MODE") {
            if mode.as_i64() != Some(MODE) {
                return Err(raw.malformed(format!("only mode {MODE} is supported, got MODE = {mode}")));
            }
        }

        let start = common::header_time(&raw, "DATE-OBS", "TIME-OBS")
            .or_else(|_| common::header_timestamp(&raw, "DATE-OBS"))?;
        let frequencies = match common::axis(&raw, "FREQUENCY", FREQUENCY_AXIS, 1.0) {
            Ok(freqs) => freqs,
            Err(_) if raw.data.nrows() == mode_357_frequencies().len() => mode_357_frequencies(),
            Err(e) => return Err(e),
        };
        let times = common::absolute_times(&raw, start, &common::axis(&raw, "TIME", TIME_AXIS, 1.0)?)?;
        let end = times.last().copied().unwrap_or(start);

        let observatory = raw.text("OBSERVAT").unwrap_or("").to_string();
        let detector = raw.text("DETECTOR").unwrap_or(ILOFAR).to_string();
        let mut meta = SpectrogramMeta::new(observatory, ILOFAR, start, end, DataUnit::Dimensionless)
            .with_detector(detector);
        meta.polarisation = raw
            .text("POLARISATION")
            .or_else(|| raw.text("POLARIZA"))
            .map(str::to_string);
        meta.extra.insert("MODE".to_string(), HeaderValue::Integer(MODE));

        let source = raw.source;
        Spectrogram::new(raw.data, times, frequencies, meta).map_err(|e| e.with_input(&source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::error::SpectrogramError;
    use crate::data::model::Header;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    fn ilofar_raw(channels: usize, mode: Option<HeaderValue>) -> RawSpectrogram {
        let mut header = Header::new();
        header.insert("INSTRUME".into(), "ILOFAR".into());
        header.insert("DATE-OBS".into(), "2021-09-08T10:00:00".into());
        header.insert("POLARISATION".into(), "X".into());
        if let Some(mode) = mode {
            header.insert("MODE".into(), mode);
        }
        RawSpectrogram::from_pair(Array2::from_elem((channels, 3), 1.5), header)
            .with_column("TIME", vec![0.0, 1.0, 2.0])
    }

    #[test]
    fn test_mode_357_axis_spans_three_receiver_modes() {
        let freqs = mode_357_frequencies();
        assert_eq!(freqs.len(), 488);
        assert_relative_eq!(freqs[0], 10.546875, epsilon = 1e-9);
        assert_relative_eq!(freqs[199], 88.28125, epsilon = 1e-9);
        assert_relative_eq!(freqs[200], 110.546875, epsilon = 1e-9);
        assert_relative_eq!(freqs[400], 210.546875, epsilon = 1e-9);
        assert_relative_eq!(freqs[487], 244.53125, epsilon = 1e-9);
        assert!(freqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_parse_keeps_mode_and_polarisation() {
        let spec = IlofarParser
            .parse(ilofar_raw(488, Some(HeaderValue::Integer(357))))
            .unwrap();
        assert_eq!(spec.shape(), (488, 3));
        assert_eq!(spec.instrument(), ILOFAR);
        assert_eq!(spec.observatory(), "");
        assert_eq!(spec.meta().polarisation.as_deref(), Some("X"));
        assert_eq!(spec.meta().extra.get("MODE"), Some(&HeaderValue::Integer(357)));
        assert_eq!(spec.times()[2], Utc.with_ymd_and_hms(2021, 9, 8, 10, 0, 2).unwrap());
    }

    #[test]
    fn test_explicit_frequency_column_wins() {
        let raw = ilofar_raw(2, None).with_column("FREQUENCY", vec![30.0, 60.0]);
        let spec = IlofarParser.parse(raw).unwrap();
        assert_eq!(spec.frequencies(), &[30.0, 60.0]);
    }

    #[test]
    fn test_other_modes_are_malformed() {
        match IlofarParser.parse(ilofar_raw(488, Some("5".into()))) {
            Err(SpectrogramError::Malformed { reason, .. }) => assert!(reason.contains("mode 357")),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_channel_count_without_axis_is_malformed() {
        assert!(IlofarParser.parse(ilofar_raw(10, None)).is_err());
    }
}
