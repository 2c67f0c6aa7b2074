//! STEREO/WAVES (SWAVES) one-minute averaged spectra.
//!
//! Text files named `swaves_{product}_{YYYYMMDD}_{a|b}_{receiver}.dat`. The
//! first row holds the channel frequencies in kHz, the second the background
//! already subtracted from the data, every further row a minute offset from
//! midnight followed by one value per channel.

use std::path::Path;

use ndarray::Array2;

use super::common::{self, FREQUENCY_AXIS, TIME_AXIS};
use crate::data::error::{Result, SpectrogramError};
use crate::data::loader::RawSpectrogram;
use crate::data::model::{DataUnit, Header, Spectrogram, SpectrogramMeta};
use crate::data::registry::{Detection, RegistryEntry, SourceParser};

pub const SWAVES: &str = "SWAVES";
const MHZ_PER_KHZ: f64 = 1e-3;
const SECONDS_PER_MINUTE: f64 = 60.0;

pub fn entry() -> RegistryEntry {
    RegistryEntry::new(
        Detection {
            instrument: is_swaves,
            telescope: Detection::never_str,
            signature: has_swaves_name,
        },
        SwavesParser,
    )
}

fn is_swaves(value: &str) -> bool {
    value.eq_ignore_ascii_case(SWAVES)
}

fn has_swaves_name(raw: &RawSpectrogram) -> bool {
    let name = raw.file_name_lower();
    name.starts_with("swaves_") && name.ends_with(".dat")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SwavesParser;

impl SourceParser for SwavesParser {
    fn name(&self) -> &'static str {
        SWAVES
    }

    fn default_observatory(&self) -> &'static str {
        "STEREO"
    }

    fn parse(&self, raw: RawSpectrogram) -> Result<Spectrogram> {
        let start = common::header_time(&raw, "DATE-OBS", "TIME-OBS")?;
        let frequencies = common::axis(&raw, "FREQUENCY", FREQUENCY_AXIS, MHZ_PER_KHZ)?;
        let times = common::absolute_times(
            &raw,
            start,
            &common::axis(&raw, "TIME", TIME_AXIS, SECONDS_PER_MINUTE)?,
        )?;
        let end = times.last().copied().unwrap_or(start);

        let observatory = raw.text("OBSERVAT").unwrap_or("").to_string();
        let detector = raw.text("DETECTOR").unwrap_or(SWAVES).to_string();
        let mut meta = SpectrogramMeta::new(observatory, SWAVES, start, end, DataUnit::Decibel)
            .with_detector(detector);
        meta.background = raw.column("BACKGROUND").map(<[f64]>::to_vec);
        if let Some(product) = raw.card("PRODUCT") {
            meta.extra.insert("PRODUCT".to_string(), product.clone());
        }

        let source = raw.source;
        Spectrogram::new(raw.data, times, frequencies, meta).map_err(|e| e.with_input(&source))
    }
}

// ---------------------------------------------------------------------------
// .dat reader
// ---------------------------------------------------------------------------

pub fn read_dat(path: &Path) -> Result<RawSpectrogram> {
    let source = path.display().to_string();
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let [name, product, date, spacecraft, receiver] = stem
        .split('_')
        .collect::<Vec<_>>()
        .try_into()
        .map_err(|_| {
            SpectrogramError::malformed(
                &source,
                "expected a name like swaves_{product}_{YYYYMMDD}_{spacecraft}_{receiver}.dat",
            )
        })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(&source, e))?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.map_err(|e| csv_error(&source, e))?;
        let values = record
            .iter()
            .filter(|tok| !tok.trim().is_empty())
            .enumerate()
            .map(|(j, tok)| {
                tok.trim().parse::<f64>().map_err(|_| {
                    SpectrogramError::malformed(
                        &source,
                        format!("row {row_no}, field {j}: '{tok}' is not a number"),
                    )
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        if !values.is_empty() {
            rows.push(values);
        }
    }

    let mut rows = rows.into_iter();
    let (Some(frequencies), Some(background)) = (rows.next(), rows.next()) else {
        return Err(SpectrogramError::malformed(
            &source,
            "missing frequency and background rows",
        ));
    };
    let n_freq = frequencies.len();
    let mut minutes = Vec::new();
    let mut flat = Vec::new();
    for (i, row) in rows.enumerate() {
        if row.len() != n_freq + 1 {
            return Err(SpectrogramError::malformed(
                &source,
                format!("sample row {i} has {} values, expected {}", row.len(), n_freq + 1),
            ));
        }
        minutes.push(row[0]);
        flat.extend_from_slice(&row[1..]);
    }
    let by_time = Array2::from_shape_vec((minutes.len(), n_freq), flat)
        .map_err(|e| SpectrogramError::malformed(&source, e.to_string()))?;

    let mut header = Header::new();
    header.insert("INSTRUME".into(), name.into());
    header.insert("OBSERVAT".into(), format!("STEREO {}", spacecraft.to_uppercase()).into());
    header.insert("PRODUCT".into(), product.into());
    header.insert("DETECTOR".into(), receiver.into());
    header.insert("DATE-OBS".into(), date.into());
    header.insert("TIME-OBS".into(), "00:00:00".into());

    Ok(RawSpectrogram {
        source,
        file_name: None,
        header,
        data: by_time.reversed_axes(),
        columns: [
            ("FREQUENCY".to_string(), frequencies),
            ("BACKGROUND".to_string(), background),
            ("TIME".to_string(), minutes),
        ]
        .into_iter()
        .collect(),
    })
}

fn csv_error(source: &str, err: csv::Error) -> SpectrogramError {
    match err.into_kind() {
        csv::ErrorKind::Io(io) => SpectrogramError::Io(io),
        other => SpectrogramError::malformed(source, format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    const SAMPLE: &str = "  2.6  3.5  153.4\n  0.1  0.2  0.3\n 0.0  1.0  2.0  3.0\n 1.0  4.0  5.0  6.0\n";

    fn write_sample(name: &str, contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(contents.as_bytes())
            .unwrap();
        (dir, path)
    }

    #[test]
    fn test_read_dat_layout() {
        let (_dir, path) = write_sample("swaves_average_20201128_a_hfr.dat", SAMPLE);
        let raw = read_dat(&path).unwrap();
        assert_eq!(raw.data.dim(), (3, 2));
        assert_eq!(raw.data[[2, 1]], 6.0);
        assert_eq!(raw.text("OBSERVAT"), Some("STEREO A"));
        assert_eq!(raw.column("TIME"), Some(&[0.0, 1.0][..]));
    }

    #[test]
    fn test_parse_normalises_units() {
        let (_dir, path) = write_sample("swaves_average_20201128_b_lfr.dat", SAMPLE);
        let spec = SwavesParser.parse(read_dat(&path).unwrap()).unwrap();
        assert_eq!(spec.observatory(), "STEREO B");
        assert_eq!(spec.detector(), "lfr");
        assert_relative_eq!(spec.frequencies()[2], 0.1534, epsilon = 1e-12);
        assert_eq!(spec.times()[1], Utc.with_ymd_and_hms(2020, 11, 28, 0, 1, 0).unwrap());
        assert_eq!(spec.meta().background.as_deref(), Some(&[0.1, 0.2, 0.3][..]));
    }

    #[test]
    fn test_ragged_row_is_malformed() {
        let (_dir, path) = write_sample(
            "swaves_average_20201128_a_hfr.dat",
            "2.6 3.5\n0.1 0.2\n0.0 1.0\n",
        );
        assert!(matches!(read_dat(&path), Err(SpectrogramError::Malformed { .. })));
    }

    #[test]
    fn test_bad_file_name_is_malformed() {
        let (_dir, path) = write_sample("swaves_average.dat", SAMPLE);
        assert!(read_dat(&path).is_err());
    }
}
