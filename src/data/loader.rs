use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde_json::Value as JsonValue;

use super::error::{Result, SpectrogramError};
use super::model::{Header, HeaderValue};
use crate::sources::{rstn, swaves};

// ---------------------------------------------------------------------------
// RawSpectrogram – a header plus data block, before any source parsing
// ---------------------------------------------------------------------------

/// Source label of caller-supplied data/header pairs.
pub const PAIR_SOURCE: &str = "data/header pair";

/// Header, primary data block and auxiliary axis tables extracted from one input.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSpectrogram {
    /// Identity of the input (path, URL or pair label) used in error messages.
    pub source: String,
    /// File name of the input, when it came from a file.
    pub file_name: Option<String>,
    pub header: Header,
    pub data: Array2<f64>,
    /// Named columns from table extensions (e.g. `TIME`, `FREQUENCY`).
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl RawSpectrogram {
    /// Wrap a caller-supplied data/header pair.
    pub fn from_pair(data: Array2<f64>, header: Header) -> Self {
        RawSpectrogram {
            source: PAIR_SOURCE.to_string(),
            file_name: None,
            header,
            data,
            columns: BTreeMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.insert(name.into(), values);
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Header card looked up case-insensitively, as FITS keywords are.
    pub fn card(&self, key: &str) -> Option<&HeaderValue> {
        self.header.get(key).or_else(|| {
            self.header
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// Non-blank text value of a header card.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.card(key).and_then(HeaderValue::as_text)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.card(key).and_then(HeaderValue::as_f64)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .get(name)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(Vec::as_slice)
    }

    /// Lower-cased file name, or an empty string for in-memory pairs.
    pub fn file_name_lower(&self) -> String {
        self.file_name
            .as_deref()
            .unwrap_or("")
            .to_ascii_lowercase()
    }

    pub fn malformed(&self, reason: impl Into<String>) -> SpectrogramError {
        SpectrogramError::malformed(self.source.clone(), reason)
    }
}

// ---------------------------------------------------------------------------
// External I/O collaborators
// ---------------------------------------------------------------------------

/// One header-data unit of a FITS file.
#[derive(Debug, Clone, Default)]
pub struct Hdu {
    pub header: Header,
    pub image: Option<Array2<f64>>,
    /// Binary-table columns, flattened.
    pub table: BTreeMap<String, Vec<f64>>,
}

/// Byte-level FITS decoding, supplied by the caller.
pub trait FitsDecoder: Send + Sync {
    /// Decode every HDU of the file, primary first.
    fn decode(&self, path: &Path) -> anyhow::Result<Vec<Hdu>>;
}

/// Retrieval of remote inputs, supplied by the caller.
pub trait Fetcher: Send + Sync {
    /// Download `url` and return the local path of the copy.
    fn fetch(&self, url: &str) -> anyhow::Result<PathBuf>;
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Read a file into a raw spectrogram.  Dispatch by extension.
///
/// Supported formats:
/// * `.json`                  – data/header pair (see [`load_json`])
/// * `.srs` `.srs.gz`         – RSTN binary spectral records
/// * `.dat`                   – STEREO/WAVES text averages (`swaves_*` names only)
/// * `.fit` `.fits` `.fts`    – FITS, optionally gzipped, via `fits`
pub fn read_file(path: &Path, fits: Option<&dyn FitsDecoder>) -> Result<RawSpectrogram> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string();
    let lower = name.to_ascii_lowercase();
    let ext = fits_extension(&lower)
        .or_else(|| lower.ends_with(".srs.gz").then(|| "srs".to_string()))
        .unwrap_or_else(|| {
            path.extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_ascii_lowercase()
        });
    log::debug!("reading {} as .{ext}", path.display());

    let raw = match ext.as_str() {
        "json" => load_json(path)?,
        "srs" => rstn::read_srs(path)?,
        "dat" if lower.contains("swaves") => swaves::read_dat(path)?,
        "fits" => {
            let decoder = fits.ok_or_else(|| SpectrogramError::MissingCollaborator {
                collaborator: "FITS decoder",
                input: path.display().to_string(),
            })?;
            load_fits(path, decoder)?
        }
        _ => return Err(SpectrogramError::unsupported(path.display().to_string())),
    };
    Ok(raw.with_file_name(name))
}

/// `.fit`, `.fits`, `.fts` and their `.gz` forms all go to the FITS decoder.
fn fits_extension(lower_name: &str) -> Option<String> {
    let stem = lower_name.strip_suffix(".gz").unwrap_or(lower_name);
    [".fit", ".fits", ".fts"]
        .iter()
        .any(|ext| stem.ends_with(ext))
        .then(|| "fits".to_string())
}

// ---------------------------------------------------------------------------
// FITS
// ---------------------------------------------------------------------------

/// Primary HDU supplies header and image; table columns of later HDUs become
/// the raw spectrogram's columns (first occurrence of a name wins).
fn load_fits(path: &Path, decoder: &dyn FitsDecoder) -> Result<RawSpectrogram> {
    let source = path.display().to_string();
    let mut hdus = decoder.decode(path)?.into_iter();
    let primary = hdus
        .next()
        .ok_or_else(|| SpectrogramError::malformed(&source, "file has no HDUs"))?;
    let data = primary
        .image
        .ok_or_else(|| SpectrogramError::malformed(&source, "primary HDU holds no image"))?;

    let mut columns = primary.table;
    for hdu in hdus {
        for (name, values) in hdu.table {
            columns.entry(name).or_insert(values);
        }
    }

    Ok(RawSpectrogram {
        source,
        file_name: None,
        header: primary.header,
        data,
        columns,
    })
}

// ---------------------------------------------------------------------------
// JSON data/header pair
// ---------------------------------------------------------------------------

/// Expected JSON schema, rows of `data` are frequency channels:
///
/// ```json
/// {
///   "header":  { "INSTRUME": "BIR", "CONTENT": "... e-CALLISTO ...", ... },
///   "data":    [[12.0, 13.0, ...], ...],
///   "columns": { "TIME": [0.0, 0.25, ...], "FREQUENCY": [91.8, ...] }
/// }
/// ```
pub fn load_json(path: &Path) -> Result<RawSpectrogram> {
    let source = path.display().to_string();
    let text = std::fs::read_to_string(path)?;
    let root: JsonValue = serde_json::from_str(&text)
        .map_err(|e| SpectrogramError::malformed(&source, format!("invalid JSON: {e}")))?;
    let obj = root
        .as_object()
        .ok_or_else(|| SpectrogramError::malformed(&source, "expected a top-level JSON object"))?;

    let mut header = Header::new();
    if let Some(cards) = obj.get("header") {
        let cards = cards
            .as_object()
            .ok_or_else(|| SpectrogramError::malformed(&source, "'header' is not an object"))?;
        for (key, val) in cards {
            header.insert(key.clone(), json_to_header_value(val));
        }
    }

    let rows = obj
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| SpectrogramError::malformed(&source, "missing or invalid 'data' array"))?;
    let mut flat = Vec::new();
    let mut n_cols = None;
    for (i, row) in rows.iter().enumerate() {
        let values = json_array_to_f64(Some(row), &source, &format!("data[{i}]"))?;
        match n_cols {
            None => n_cols = Some(values.len()),
            Some(n) if n != values.len() => {
                return Err(SpectrogramError::malformed(
                    &source,
                    format!("data[{i}] has {} values but data[0] has {n}", values.len()),
                ));
            }
            Some(_) => {}
        }
        flat.extend(values);
    }
    let data = Array2::from_shape_vec((rows.len(), n_cols.unwrap_or(0)), flat)
        .map_err(|e| SpectrogramError::malformed(&source, e.to_string()))?;

    let mut columns = BTreeMap::new();
    if let Some(cols) = obj.get("columns") {
        let cols = cols
            .as_object()
            .ok_or_else(|| SpectrogramError::malformed(&source, "'columns' is not an object"))?;
        for (name, val) in cols {
            columns.insert(name.clone(), json_array_to_f64(Some(val), &source, name)?);
        }
    }

    Ok(RawSpectrogram {
        source,
        file_name: None,
        header,
        data,
        columns,
    })
}

fn json_array_to_f64(val: Option<&JsonValue>, source: &str, col: &str) -> Result<Vec<f64>> {
    let arr = val.and_then(|v| v.as_array()).ok_or_else(|| {
        SpectrogramError::malformed(source, format!("missing or invalid '{col}' array"))
    })?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64().ok_or_else(|| {
                SpectrogramError::malformed(source, format!("{col}[{j}]: not a number"))
            })
        })
        .collect()
}

fn json_to_header_value(val: &JsonValue) -> HeaderValue {
    match val {
        JsonValue::String(s) => HeaderValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                HeaderValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                HeaderValue::Float(f)
            } else {
                HeaderValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => HeaderValue::Bool(*b),
        JsonValue::Null => HeaderValue::Null,
        other => HeaderValue::String(other.to_string()),
    }
}
