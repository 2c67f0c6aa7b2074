//! Ingest of solar radio spectrogram data products.
//!
//! Files, URLs and in-memory data/header pairs from several instruments
//! (e-CALLISTO, EOVSA, RSTN, STEREO/WAVES, WIND/WAVES, PSP/RFS, I-LOFAR,
//! Solar Orbiter RPW) are normalised
//! into one [`Spectrogram`] model by the [`SpectrogramFactory`], and
//! time-adjacent spectrograms of one instrument are combined with
//! [`join_many`].

pub mod config;
pub mod data;
pub mod net;
pub mod sources;

pub use config::IngestConfig;
pub use data::error::{Result, SpectrogramError};
pub use data::factory::{FactoryInput, SpectrogramFactory};
pub use data::join::{join_many, join_many_with, JoinOptions};
pub use data::loader::{Fetcher, FitsDecoder, Hdu, RawSpectrogram};
pub use data::model::{
    DataUnit, Header, HeaderValue, ObservatoryLocation, Spectrogram, SpectrogramMeta, TimeRange,
};
pub use data::registry::{SourceParser, SourceRegistry};
