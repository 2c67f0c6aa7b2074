use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::error::{Result, SpectrogramError};
use super::loader::RawSpectrogram;
use super::model::Spectrogram;
use crate::sources;

/// Header card naming the instrument.
pub const INSTRUMENT_CARD: &str = "INSTRUME";
/// Secondary identity card naming the telescope or observatory.
pub const TELESCOPE_CARD: &str = "TELESCOP";

// ---------------------------------------------------------------------------
// Parser capability and detection predicates
// ---------------------------------------------------------------------------

/// Instrument-specific conversion of a raw input into a [`Spectrogram`].
pub trait SourceParser: Send + Sync {
    /// Identity token of the instrument family, e.g. `"e-CALLISTO"`.
    fn name(&self) -> &'static str;

    /// Observatory used when a parsed spectrogram leaves it empty.
    fn default_observatory(&self) -> &'static str;

    fn parse(&self, raw: RawSpectrogram) -> Result<Spectrogram>;
}

/// Predicates deciding whether a registry entry applies to an input, one per
/// stage of the fallback chain.
#[derive(Clone, Copy)]
pub struct Detection {
    /// Matches the `INSTRUME` card.
    pub instrument: fn(&str) -> bool,
    /// Matches the `TELESCOP` card.
    pub telescope: fn(&str) -> bool,
    /// Matches a file-name or content signature of a known layout.
    pub signature: fn(&RawSpectrogram) -> bool,
}

impl Detection {
    pub fn never_str(_: &str) -> bool {
        false
    }

    pub fn never_raw(_: &RawSpectrogram) -> bool {
        false
    }
}

impl fmt::Debug for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Detection { .. }")
    }
}

/// Stage of the fallback chain that selected a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Instrument,
    Telescope,
    Signature,
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchStage::Instrument => INSTRUMENT_CARD,
            DispatchStage::Telescope => TELESCOPE_CARD,
            DispatchStage::Signature => "signature",
        };
        write!(f, "{s}")
    }
}

pub struct RegistryEntry {
    pub token: &'static str,
    pub detection: Detection,
    pub parser: Box<dyn SourceParser>,
}

impl RegistryEntry {
    pub fn new(detection: Detection, parser: impl SourceParser + 'static) -> Self {
        RegistryEntry {
            token: parser.name(),
            detection,
            parser: Box::new(parser),
        }
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// SourceRegistry – ordered, immutable after construction
// ---------------------------------------------------------------------------

/// Ordered list of sources. Earlier entries win when several match.
#[derive(Debug)]
pub struct SourceRegistry {
    entries: Vec<RegistryEntry>,
}

/// Collects entries before freezing them into a [`SourceRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<RegistryEntry>,
}

impl RegistryBuilder {
    pub fn register(mut self, entry: RegistryEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn build(self) -> SourceRegistry {
        SourceRegistry {
            entries: self.entries,
        }
    }
}

static DEFAULT_REGISTRY: Lazy<Arc<SourceRegistry>> =
    Lazy::new(|| Arc::new(sources::register_defaults(SourceRegistry::builder()).build()));

impl SourceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Process-wide registry holding every built-in source.
    pub fn global() -> Arc<SourceRegistry> {
        Arc::clone(&DEFAULT_REGISTRY)
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn tokens(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.token).collect()
    }

    /// Pick the source for `raw`.
    ///
    /// Order: `INSTRUME` card, then `TELESCOP` card, then file-name/content
    /// signatures. Fails with `UnsupportedFormat` naming the input when no stage
    /// matches.
    pub fn select(&self, raw: &RawSpectrogram) -> Result<(&RegistryEntry, DispatchStage)> {
        if let Some(instrument) = raw.text(INSTRUMENT_CARD) {
            if let Some(entry) = self.entries.iter().find(|e| (e.detection.instrument)(instrument)) {
                return Ok((entry, DispatchStage::Instrument));
            }
            log::debug!("{}: {INSTRUMENT_CARD} '{instrument}' not recognised", raw.source);
        }
        if let Some(telescope) = raw.text(TELESCOPE_CARD) {
            if let Some(entry) = self.entries.iter().find(|e| (e.detection.telescope)(telescope)) {
                return Ok((entry, DispatchStage::Telescope));
            }
            log::debug!("{}: {TELESCOPE_CARD} '{telescope}' not recognised", raw.source);
        }
        self.entries
            .iter()
            .find(|e| (e.detection.signature)(raw))
            .map(|entry| (entry, DispatchStage::Signature))
            .ok_or_else(|| SpectrogramError::unsupported(raw.source.clone()))
    }
}
