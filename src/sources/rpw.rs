//! Solar Orbiter Radio and Plasma Waves (RPW) High Frequency Receiver, level-2
//! survey product (`RPW-HFR-SURV`).
//!
//! HFR records are single frequency samples taken during a sweep, not a
//! regular grid. CDF variables are decoded outside this crate and handed in as
//! a data/header pair: the data block holds `AGC1` and `AGC2` as rows, one
//! column per record, with per-record `EPOCH` (TT2000 nanoseconds),
//! `FREQUENCY` (kHz) and `SWEEP_NUM` columns. `DETECTOR` picks the receiver
//! channel (`RPW-AGC1` or `RPW-AGC2`). Each sweep becomes one time column
//! stamped with its first record; channels a sweep did not visit stay NaN.

use ndarray::Array2;

use crate::data::error::Result;
use crate::data::loader::RawSpectrogram;
use crate::data::model::{DataUnit, HeaderValue, Spectrogram, SpectrogramMeta};
use crate::data::registry::{Detection, RegistryEntry, SourceParser};
use crate::data::time;

pub const RPW: &str = "RPW";
const OBSERVATORY: &str = "SOLO";
const PRODUCT: &str = "RPW-HFR-SURV";
const DETECTORS: [&str; 2] = ["RPW-AGC1", "RPW-AGC2"];

/// HFR channel grid: 375 kHz upwards in 50 kHz steps.
const FIRST_CHANNEL_KHZ: f64 = 375.0;
const CHANNEL_STEP_KHZ: f64 = 50.0;
const HFR_CHANNELS: usize = 321;
const MHZ_PER_KHZ: f64 = 1e-3;

pub fn entry() -> RegistryEntry {
    RegistryEntry::new(
        Detection {
            instrument: is_rpw,
            telescope: is_solo,
            signature: Detection::never_raw,
        },
        RpwParser,
    )
}

fn is_rpw(value: &str) -> bool {
    value.eq_ignore_ascii_case(RPW)
}

fn is_solo(value: &str) -> bool {
    value.eq_ignore_ascii_case(OBSERVATORY) || value.eq_ignore_ascii_case("Solar Orbiter")
}

/// Antenna configuration named by an HFR `SENSOR_CONFIG` code.
pub fn sensor_name(code: i64) -> Option<&'static str> {
    match code {
        1 => Some("V1"),
        2 => Some("V2"),
        3 => Some("V3"),
        4 => Some("V1-V2"),
        5 => Some("V2-V3"),
        6 => Some("V3-V1"),
        7 => Some("B_MF"),
        9 => Some("HF_V1-V2"),
        10 => Some("HF_V2-V3"),
        11 => Some("HF_V3-V1"),
        _ => None,
    }
}

/// Channel frequencies of the HFR grid in MHz.
pub fn hfr_frequencies() -> Vec<f64> {
    (0..HFR_CHANNELS)
        .map(|k| (FIRST_CHANNEL_KHZ + CHANNEL_STEP_KHZ * k as f64) * MHZ_PER_KHZ)
        .collect()
}

fn channel_index(khz: f64) -> Option<usize> {
    let k = ((khz - FIRST_CHANNEL_KHZ) / CHANNEL_STEP_KHZ).round();
    (k >= 0.0 && k < HFR_CHANNELS as f64).then_some(k as usize)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RpwParser;

impl RpwParser {
    fn record_column<'a>(raw: &'a RawSpectrogram, name: &str) -> Result<&'a [f64]> {
        let values = raw
            .column(name)
            .ok_or_else(|| raw.malformed(format!("missing {name} column")))?;
        if values.len() != raw.data.ncols() {
            return Err(raw.malformed(format!(
                "{name} has {} entries but there are {} records",
                values.len(),
                raw.data.ncols()
            )));
        }
        Ok(values)
    }
}

impl SourceParser for RpwParser {
    fn name(&self) -> &'static str {
        RPW
    }

    fn default_observatory(&self) -> &'static str {
        OBSERVATORY
    }

    fn parse(&self, raw: RawSpectrogram) -> Result<Spectrogram> {
        if let Some(descriptor) = raw.text("DESCRIPTOR") {
            if !descriptor.contains(PRODUCT) {
                return Err(raw.malformed(format!(
                    "only level-2 {PRODUCT} data is supported, got {descriptor}"
                )));
            }
        }
        let detector = raw.text("DETECTOR").unwrap_or(DETECTORS[0]).to_ascii_uppercase();
        let row = DETECTORS
            .iter()
            .position(|d| *d == detector)
            .ok_or_else(|| raw.malformed("DETECTOR must be RPW-AGC1 or RPW-AGC2"))?;
        if raw.data.nrows() != DETECTORS.len() {
            return Err(raw.malformed(format!(
                "expected AGC1 and AGC2 rows, data block has {}",
                raw.data.nrows()
            )));
        }
        if raw.data.ncols() == 0 {
            return Err(raw.malformed("no HFR records"));
        }

        let epochs = Self::record_column(&raw, "EPOCH")?;
        let freqs_khz = Self::record_column(&raw, "FREQUENCY")?;
        let sweeps = Self::record_column(&raw, "SWEEP_NUM")?;

        let n_rec = sweeps.len();
        let sweep_starts: Vec<usize> = (0..n_rec)
            .filter(|&i| i == 0 || sweeps[i] != sweeps[i - 1])
            .collect();

        let mut data = Array2::from_elem((HFR_CHANNELS, sweep_starts.len()), f64::NAN);
        let mut times = Vec::with_capacity(sweep_starts.len());
        for (col, &first) in sweep_starts.iter().enumerate() {
            let stop = sweep_starts.get(col + 1).copied().unwrap_or(n_rec);
            let epoch = epochs[first];
            let stamp = Some(epoch)
                .filter(|ns| ns.is_finite() && ns.abs() < i64::MAX as f64)
                .and_then(|ns| time::from_tt2000(ns as i64))
                .ok_or_else(|| raw.malformed(format!("EPOCH[{first}] out of range")))?;
            times.push(stamp);
            for i in first..stop {
                let channel = channel_index(freqs_khz[i]).ok_or_else(|| {
                    raw.malformed(format!("FREQUENCY[{i}] = {} kHz is off the HFR grid", freqs_khz[i]))
                })?;
                data[[channel, col]] = raw.data[[row, i]];
            }
        }
        let (Some(&start), Some(&end)) = (times.first(), times.last()) else {
            return Err(raw.malformed("no HFR sweeps"));
        };

        let mut meta =
            SpectrogramMeta::new(OBSERVATORY, RPW, start, end, DataUnit::VoltsSquaredPerHertz)
                .with_detector(DETECTORS[row]);
        let sensor_column = format!("SENSOR_{}", &DETECTORS[row][4..]);
        if let Some(sensor) = raw
            .column(&sensor_column)
            .and_then(|codes| codes.first())
            .and_then(|&code| sensor_name(code as i64))
        {
            meta.extra.insert("SENSOR".to_string(), HeaderValue::from(sensor));
        }
        if raw.data.row(row).iter().all(|v| *v == 0.0) {
            log::warn!("{} holds no signal in {}", DETECTORS[row], raw.source);
        }

        Spectrogram::new(data, times, hfr_frequencies(), meta).map_err(|e| e.with_input(&raw.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::error::SpectrogramError;
    use crate::data::model::Header;
    use approx::assert_relative_eq;

    /// Two sweeps: records 0..3 visit 375, 425 and 475 kHz, records 3..5 visit
    /// 375 and 16375 kHz. AGC1 values are `record + 1`, AGC2 ten times that.
    fn rpw_raw(detector: Option<&str>) -> RawSpectrogram {
        let mut header = Header::new();
        header.insert("INSTRUME".into(), RPW.into());
        header.insert("DESCRIPTOR".into(), "RPW-HFR-SURV>RPW HFR survey data".into());
        if let Some(d) = detector {
            header.insert("DETECTOR".into(), d.into());
        }
        let data = Array2::from_shape_fn((2, 5), |(r, c)| (c + 1) as f64 * if r == 0 { 1.0 } else { 10.0 });
        let t0 = 6.5e17;
        RawSpectrogram::from_pair(data, header)
            .with_column("EPOCH", vec![t0, t0 + 1e8, t0 + 2e8, t0 + 1.6e10, t0 + 1.61e10])
            .with_column("FREQUENCY", vec![375.0, 425.0, 475.0, 375.0, 16_375.0])
            .with_column("SWEEP_NUM", vec![7.0, 7.0, 7.0, 8.0, 8.0])
            .with_column("SENSOR_AGC1", vec![9.0, 9.0, 9.0, 9.0, 9.0])
            .with_column("SENSOR_AGC2", vec![5.0, 5.0, 5.0, 5.0, 5.0])
    }

    #[test]
    fn test_sweeps_become_columns_on_the_hfr_grid() {
        let spec = RpwParser.parse(rpw_raw(None)).unwrap();
        assert_eq!(spec.shape(), (HFR_CHANNELS, 2));
        assert_eq!(spec.detector(), "RPW-AGC1");
        assert_eq!(spec.unit(), DataUnit::VoltsSquaredPerHertz);
        assert_relative_eq!(spec.frequencies()[0], 0.375, epsilon = 1e-12);
        assert_relative_eq!(spec.frequencies()[HFR_CHANNELS - 1], 16.375, epsilon = 1e-9);
        assert_eq!(spec.data()[[0, 0]], 1.0);
        assert_eq!(spec.data()[[2, 0]], 3.0);
        assert!(spec.data()[[1, 1]].is_nan());
        assert_eq!(spec.data()[[HFR_CHANNELS - 1, 1]], 5.0);
        assert_eq!(spec.times()[1] - spec.times()[0], chrono::Duration::seconds(16));
        assert_eq!(spec.meta().extra.get("SENSOR"), Some(&HeaderValue::from("HF_V1-V2")));
    }

    #[test]
    fn test_detector_selects_agc_channel() {
        let spec = RpwParser.parse(rpw_raw(Some("rpw-agc2"))).unwrap();
        assert_eq!(spec.detector(), "RPW-AGC2");
        assert_eq!(spec.data()[[0, 1]], 40.0);
        assert_eq!(spec.meta().extra.get("SENSOR"), Some(&HeaderValue::from("V2-V3")));
    }

    #[test]
    fn test_other_products_are_malformed() {
        let mut raw = rpw_raw(None);
        raw.header.insert("DESCRIPTOR".into(), "RPW-TNR-SURV>TNR survey".into());
        match RpwParser.parse(raw) {
            Err(SpectrogramError::Malformed { reason, .. }) => assert!(reason.contains(PRODUCT)),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_off_grid_frequency_and_short_columns_are_malformed() {
        let raw = rpw_raw(None).with_column("FREQUENCY", vec![375.0, 425.0, 475.0, 375.0, 99_999.0]);
        let err = RpwParser.parse(raw).unwrap_err();
        assert!(err.to_string().contains("FREQUENCY[4]"));

        let raw = rpw_raw(None).with_column("SWEEP_NUM", vec![7.0]);
        let err = RpwParser.parse(raw).unwrap_err();
        assert!(err.to_string().contains("SWEEP_NUM has 1 entries"));
    }

    #[test]
    fn test_unknown_detector_is_malformed() {
        assert!(RpwParser.parse(rpw_raw(Some("RPW-AGC3"))).is_err());
    }
}
