//! Parker Solar Probe FIELDS Radio Frequency Spectrometer (RFS), LFR and HFR.
//!
//! Level-2 CDF variables are decoded outside this crate and handed in as a
//! data/header pair laid out `(time, frequency)` as stored in the CDF, with
//! `epoch` (TT2000 nanoseconds) and `frequency` (Hz) columns.

use crate::data::error::Result;
use crate::data::loader::RawSpectrogram;
use crate::data::model::{DataUnit, Spectrogram, SpectrogramMeta};
use crate::data::registry::{Detection, RegistryEntry, SourceParser};
use crate::data::time;

pub const RFS: &str = "FIELDS/RFS";
const OBSERVATORY: &str = "PSP";
const MHZ_PER_HZ: f64 = 1e-6;

pub fn entry() -> RegistryEntry {
    RegistryEntry::new(
        Detection {
            instrument: is_rfs,
            telescope: is_psp,
            signature: Detection::never_raw,
        },
        RfsParser,
    )
}

fn is_rfs(value: &str) -> bool {
    value.eq_ignore_ascii_case(RFS)
}

fn is_psp(value: &str) -> bool {
    value.eq_ignore_ascii_case(OBSERVATORY)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RfsParser;

impl SourceParser for RfsParser {
    fn name(&self) -> &'static str {
        RFS
    }

    fn default_observatory(&self) -> &'static str {
        OBSERVATORY
    }

    fn parse(&self, raw: RawSpectrogram) -> Result<Spectrogram> {
        let detector = raw
            .text("DETECTOR")
            .map(str::to_ascii_lowercase)
            .filter(|d| d == "lfr" || d == "hfr")
            .ok_or_else(|| raw.malformed("DETECTOR must be lfr or hfr"))?;

        let epochs = raw
            .column("epoch")
            .ok_or_else(|| raw.malformed("missing epoch column"))?;
        let times = epochs
            .iter()
            .enumerate()
            .map(|(i, &ns)| {
                Some(ns)
                    .filter(|ns| ns.is_finite() && ns.abs() < i64::MAX as f64)
                    .and_then(|ns| time::from_tt2000(ns as i64))
                    .ok_or_else(|| raw.malformed(format!("epoch[{i}] out of range")))
            })
            .collect::<Result<Vec<_>>>()?;
        let (Some(&start), Some(&end)) = (times.first(), times.last()) else {
            return Err(raw.malformed("epoch column is empty"));
        };

        // Frequencies are tabulated per record; every record shares the first row.
        let n_freq = raw.data.ncols();
        let frequencies: Vec<f64> = raw
            .column("frequency")
            .ok_or_else(|| raw.malformed("missing frequency column"))?
            .iter()
            .take(n_freq)
            .map(|hz| hz * MHZ_PER_HZ)
            .collect();

        let meta = SpectrogramMeta::new(
            OBSERVATORY,
            RFS,
            start,
            end,
            DataUnit::VoltsSquaredPerHertz,
        )
        .with_detector(detector);

        let data = raw.data.t().to_owned();
        Spectrogram::new(data, times, frequencies, meta).map_err(|e| e.with_input(&raw.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Header;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn rfs_raw(detector: &str) -> RawSpectrogram {
        let mut header = Header::new();
        header.insert("INSTRUME".into(), RFS.into());
        header.insert("DETECTOR".into(), detector.into());
        // (time, frequency) layout: 3 records of 2 channels.
        let data = Array2::from_shape_vec((3, 2), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let t0 = 6.0e17;
        RawSpectrogram::from_pair(data, header)
            .with_column("epoch", vec![t0, t0 + 7e9, t0 + 14e9])
            .with_column("frequency", vec![10_546.88, 1_687_500.0, 10_546.88, 1_687_500.0])
    }

    #[test]
    fn test_transposes_into_frequency_by_time() {
        let spec = RfsParser.parse(rfs_raw("LFR")).unwrap();
        assert_eq!(spec.shape(), (2, 3));
        assert_eq!(spec.data()[[1, 0]], 2.0);
        assert_eq!(spec.data()[[0, 2]], 5.0);
        assert_eq!(spec.detector(), "lfr");
        assert_eq!(spec.unit(), DataUnit::VoltsSquaredPerHertz);
        assert_relative_eq!(spec.frequencies()[1], 1.6875, epsilon = 1e-12);
        assert_eq!(spec.times()[1] - spec.times()[0], chrono::Duration::seconds(7));
    }

    #[test]
    fn test_out_of_range_epoch_is_malformed() {
        let raw = rfs_raw("hfr").with_column("epoch", vec![6.0e17, f64::NAN, 6.0e17]);
        let err = RfsParser.parse(raw).unwrap_err();
        assert!(err.to_string().contains("epoch[1] out of range"));
        let raw = rfs_raw("hfr").with_column("epoch", vec![6.0e17, 6.0e17, 9.2e18]);
        assert!(RfsParser.parse(raw).is_err());
    }

    #[test]
    fn test_unknown_detector_is_malformed() {
        assert!(RfsParser.parse(rfs_raw("mfr")).is_err());
    }

    #[test]
    fn test_missing_frequency_column_is_malformed() {
        let mut raw = rfs_raw("hfr");
        raw.columns.remove("frequency");
        let err = RfsParser.parse(raw).unwrap_err();
        assert!(err.to_string().contains("frequency"));
    }
}
