use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::Array2;

use super::error::{Result, SpectrogramError};
use super::join;
use super::loader::{self, Fetcher, FitsDecoder, RawSpectrogram};
use super::model::{Header, Spectrogram};
use super::registry::SourceRegistry;
use crate::config::IngestConfig;

/// One input accepted by the factory.
#[derive(Debug, Clone)]
pub enum FactoryInput {
    Path(PathBuf),
    /// Remote file, fetched through the configured [`Fetcher`].
    Url(String),
    /// Header and data block already in memory.
    Pair(RawSpectrogram),
}

impl FactoryInput {
    /// Identity used in logs and errors.
    pub fn label(&self) -> String {
        match self {
            FactoryInput::Path(path) => path.display().to_string(),
            FactoryInput::Url(url) => url.clone(),
            FactoryInput::Pair(raw) => raw.source.clone(),
        }
    }
}

fn is_url(s: &str) -> bool {
    ["http://", "https://", "ftp://"]
        .iter()
        .any(|scheme| s.len() > scheme.len() && s[..scheme.len()].eq_ignore_ascii_case(scheme))
}

impl From<&str> for FactoryInput {
    fn from(s: &str) -> Self {
        if is_url(s) {
            FactoryInput::Url(s.to_string())
        } else {
            FactoryInput::Path(PathBuf::from(s))
        }
    }
}

impl From<String> for FactoryInput {
    fn from(s: String) -> Self {
        if is_url(&s) {
            FactoryInput::Url(s)
        } else {
            FactoryInput::Path(PathBuf::from(s))
        }
    }
}

impl From<PathBuf> for FactoryInput {
    fn from(path: PathBuf) -> Self {
        FactoryInput::Path(path)
    }
}

impl From<&Path> for FactoryInput {
    fn from(path: &Path) -> Self {
        FactoryInput::Path(path.to_path_buf())
    }
}

impl From<RawSpectrogram> for FactoryInput {
    fn from(raw: RawSpectrogram) -> Self {
        FactoryInput::Pair(raw)
    }
}

impl From<(Array2<f64>, Header)> for FactoryInput {
    fn from((data, header): (Array2<f64>, Header)) -> Self {
        FactoryInput::Pair(RawSpectrogram::from_pair(data, header))
    }
}

/// Turns paths, URLs and data/header pairs into spectrograms.
///
/// Each input is read into a [`RawSpectrogram`], handed to the source the
/// registry selects, and, when that source left the observatory empty, given
/// the source's default observatory.
pub struct SpectrogramFactory {
    registry: Arc<SourceRegistry>,
    fits: Option<Box<dyn FitsDecoder>>,
    fetcher: Option<Box<dyn Fetcher>>,
    config: IngestConfig,
}

impl Default for SpectrogramFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrogramFactory {
    /// Factory over every built-in source, without FITS or network access.
    pub fn new() -> Self {
        SpectrogramFactory {
            registry: SourceRegistry::global(),
            fits: None,
            fetcher: None,
            config: IngestConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<SourceRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_fits_decoder(mut self, decoder: impl FitsDecoder + 'static) -> Self {
        self.fits = Some(Box::new(decoder));
        self
    }

    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Build one spectrogram.
    pub fn spectrogram(&self, input: impl Into<FactoryInput>) -> Result<Spectrogram> {
        let input = input.into();
        log::debug!("ingesting {}", input.label());
        let raw = self.extract(input)?;
        self.dispatch(raw)
    }

    /// Build one spectrogram per input, in input order. Fails on the first
    /// input that cannot be read or parsed.
    pub fn spectrograms<I>(&self, inputs: I) -> Result<Vec<Spectrogram>>
    where
        I: IntoIterator,
        I::Item: Into<FactoryInput>,
    {
        let spectrograms = inputs
            .into_iter()
            .enumerate()
            .map(|(i, input)| {
                let input = match input.into() {
                    FactoryInput::Pair(mut raw) if raw.source == loader::PAIR_SOURCE => {
                        raw.source = format!("{} #{i}", loader::PAIR_SOURCE);
                        FactoryInput::Pair(raw)
                    }
                    other => other,
                };
                self.spectrogram(input)
            })
            .collect::<Result<Vec<_>>>()?;
        if spectrograms.is_empty() {
            return Err(SpectrogramError::EmptyInput);
        }
        Ok(spectrograms)
    }

    /// Build every input and join the results with the configured options.
    pub fn load_joined<I>(&self, inputs: I) -> Result<Spectrogram>
    where
        I: IntoIterator,
        I::Item: Into<FactoryInput>,
    {
        let spectrograms = self.spectrograms(inputs)?;
        join::join_many_with(&spectrograms, &self.config.join)
    }

    /// Select a source for an already extracted input and parse it.
    ///
    /// A `Malformed` error from the selected parser is final; no other source
    /// is tried.
    pub fn dispatch(&self, raw: RawSpectrogram) -> Result<Spectrogram> {
        let (entry, stage) = self.registry.select(&raw)?;
        log::debug!("{}: dispatched to {} by {stage}", raw.source, entry.token);

        let source = raw.source.clone();
        let mut spectrogram = entry.parser.parse(raw)?;
        let fallback = entry.parser.default_observatory();
        if spectrogram.backfill_observatory(fallback) {
            log::warn!("{source}: no observatory in header, using {fallback}");
        }
        Ok(spectrogram)
    }

    fn extract(&self, input: FactoryInput) -> Result<RawSpectrogram> {
        match input {
            FactoryInput::Path(path) => loader::read_file(&path, self.fits.as_deref()),
            FactoryInput::Url(url) => {
                let fetcher = self
                    .fetcher
                    .as_deref()
                    .ok_or_else(|| SpectrogramError::MissingCollaborator {
                        collaborator: "fetcher",
                        input: url.clone(),
                    })?;
                let local = fetcher.fetch(&url)?;
                log::debug!("fetched {url} to {}", local.display());
                let mut raw = loader::read_file(&local, self.fits.as_deref())
                    .map_err(|e| relabel(e, &url))?;
                raw.source = url;
                Ok(raw)
            }
            FactoryInput::Pair(raw) => Ok(raw),
        }
    }
}

/// Errors about a fetched file name the URL rather than the temporary copy.
fn relabel(err: SpectrogramError, url: &str) -> SpectrogramError {
    match err {
        SpectrogramError::UnsupportedFormat { .. } => SpectrogramError::unsupported(url),
        other => other.with_input(url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{DataUnit, HeaderValue, SpectrogramMeta};
    use crate::data::registry::{Detection, RegistryEntry, SourceParser};
    use crate::sources::rstn;
    use std::io::Write;

    fn callisto_header(instrume: Option<&str>) -> Header {
        let mut header = Header::new();
        header.insert("CONTENT".into(), "2011/09/22 Radio flux density, e-CALLISTO".into());
        header.insert("DATE-OBS".into(), "2011/09/22".into());
        header.insert("TIME-OBS".into(), "10:30:00".into());
        header.insert("CRVAL1".into(), 0.0.into());
        header.insert("CDELT1".into(), 0.25.into());
        header.insert("NAXIS1".into(), 4i64.into());
        header.insert("CRVAL2".into(), 45.0.into());
        header.insert("CDELT2".into(), 1.0.into());
        header.insert("NAXIS2".into(), 3i64.into());
        if let Some(station) = instrume {
            header.insert("INSTRUME".into(), station.into());
        }
        header
    }

    fn callisto_pair(instrume: Option<&str>) -> (Array2<f64>, Header) {
        (Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) as f64), callisto_header(instrume))
    }

    #[test]
    fn test_missing_station_becomes_e_callisto() {
        let spec = SpectrogramFactory::new().spectrogram(callisto_pair(None)).unwrap();
        assert_eq!(spec.observatory(), "e-CALLISTO");
        assert_eq!(spec.instrument(), "e-CALLISTO");
    }

    #[test]
    fn test_blank_station_becomes_e_callisto() {
        let spec = SpectrogramFactory::new().spectrogram(callisto_pair(Some("  "))).unwrap();
        assert_eq!(spec.observatory(), "e-CALLISTO");
    }

    #[test]
    fn test_station_is_preserved() {
        let spec = SpectrogramFactory::new().spectrogram(callisto_pair(Some("BIR"))).unwrap();
        assert_eq!(spec.observatory(), "BIR");
    }

    #[test]
    fn test_dispatch_is_deterministic() {
        let factory = SpectrogramFactory::new();
        let first = factory.spectrogram(callisto_pair(Some("BIR"))).unwrap();
        for _ in 0..3 {
            assert_eq!(factory.spectrogram(callisto_pair(Some("BIR"))).unwrap(), first);
        }
    }

    #[test]
    fn test_unrecognised_input_names_the_source() {
        let mut header = Header::new();
        header.insert("INSTRUME".into(), "MYSTERY".into());
        header.insert("DATE-OBS".into(), "2011/09/22".into());
        let err = SpectrogramFactory::new()
            .spectrogram((Array2::zeros((2, 2)), header))
            .unwrap_err();
        match err {
            SpectrogramError::UnsupportedFormat { input } => assert_eq!(input, loader::PAIR_SOURCE),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_input_is_not_retried() {
        // Declared axis length disagrees with the data block.
        let (_, header) = callisto_pair(None);
        let err = SpectrogramFactory::new()
            .spectrogram((Array2::zeros((3, 5)), header))
            .unwrap_err();
        assert!(matches!(err, SpectrogramError::Malformed { .. }));
    }

    #[test]
    fn test_list_preserves_order_and_labels_pairs() {
        let mut late = callisto_header(Some("BIR"));
        late.insert("TIME-OBS".into(), "10:45:00".into());
        let inputs = vec![
            FactoryInput::from((Array2::zeros((3, 4)), late)),
            FactoryInput::from(callisto_pair(Some("BIR"))),
        ];
        let specs = SpectrogramFactory::new().spectrograms(inputs).unwrap();
        assert_eq!(specs.len(), 2);
        assert!(specs[0].time_range().start > specs[1].time_range().start);

        let mut bad = callisto_header(None);
        bad.remove("NAXIS1");
        let inputs = vec![
            FactoryInput::from(callisto_pair(None)),
            FactoryInput::from((Array2::zeros((3, 4)), bad)),
        ];
        match SpectrogramFactory::new().spectrograms(inputs).unwrap_err() {
            SpectrogramError::Malformed { input, .. } => {
                assert_eq!(input, format!("{} #1", loader::PAIR_SOURCE))
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_list_is_rejected() {
        let err = SpectrogramFactory::new()
            .spectrograms(Vec::<FactoryInput>::new())
            .unwrap_err();
        assert!(matches!(err, SpectrogramError::EmptyInput));
    }

    #[test]
    fn test_string_inputs() {
        assert!(matches!(FactoryInput::from("https://example.org/a.fit"), FactoryInput::Url(_)));
        assert!(matches!(FactoryInput::from("FTP://host/b.srs"), FactoryInput::Url(_)));
        assert!(matches!(FactoryInput::from("data/a.fit"), FactoryInput::Path(_)));
        assert!(matches!(FactoryInput::from("http://".to_string()), FactoryInput::Path(_)));
    }

    #[test]
    fn test_srs_file_backfills_unknown_site() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("XX170907.srs");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&rstn::tests::srs_record(9, (1, 0, 0), 3)).unwrap();
        file.write_all(&rstn::tests::srs_record(9, (1, 0, 3), 4)).unwrap();
        drop(file);

        let spec = SpectrogramFactory::new().spectrogram(path.as_path()).unwrap();
        assert_eq!(spec.instrument(), "RSTN");
        assert_eq!(spec.observatory(), "RSTN");
        assert_eq!(spec.shape(), (802, 2));
    }

    struct CopyFetcher(PathBuf);

    impl Fetcher for CopyFetcher {
        fn fetch(&self, url: &str) -> anyhow::Result<PathBuf> {
            let name = url.rsplit('/').next().unwrap_or("download");
            let target = self.0.join(name);
            std::fs::write(&target, rstn::tests::srs_record(3, (2, 0, 0), 1))?;
            Ok(target)
        }
    }

    #[test]
    fn test_url_goes_through_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let factory = SpectrogramFactory::new().with_fetcher(CopyFetcher(dir.path().to_path_buf()));
        let spec = factory
            .spectrogram("https://archive.example/rstn/LM170907.srs")
            .unwrap();
        assert_eq!(spec.observatory(), "Learmonth");

        let err = factory.spectrogram("https://archive.example/unknown.bin").unwrap_err();
        match err {
            SpectrogramError::UnsupportedFormat { input } => {
                assert_eq!(input, "https://archive.example/unknown.bin")
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_url_without_fetcher() {
        let err = SpectrogramFactory::new()
            .spectrogram("https://archive.example/LM170907.srs")
            .unwrap_err();
        assert!(matches!(
            err,
            SpectrogramError::MissingCollaborator { collaborator: "fetcher", .. }
        ));
    }

    /// Source that claims every input and never sets an observatory.
    struct Anonymous;

    impl SourceParser for Anonymous {
        fn name(&self) -> &'static str {
            "ANON"
        }

        fn default_observatory(&self) -> &'static str {
            "Nowhere"
        }

        fn parse(&self, raw: RawSpectrogram) -> Result<Spectrogram> {
            let t = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;
            let meta = SpectrogramMeta::new("", "ANON", t, t, DataUnit::Dimensionless);
            let n = raw.data.nrows();
            Spectrogram::new(raw.data, vec![t], (0..n).map(|i| i as f64).collect(), meta)
        }
    }

    #[test]
    fn test_backfill_uses_selected_source_default() {
        let registry = SourceRegistry::builder()
            .register(RegistryEntry::new(
                Detection {
                    instrument: |v| v == "ANON",
                    telescope: Detection::never_str,
                    signature: Detection::never_raw,
                },
                Anonymous,
            ))
            .build();
        let mut header = Header::new();
        header.insert("INSTRUME".into(), HeaderValue::from("ANON"));
        let spec = SpectrogramFactory::new()
            .with_registry(Arc::new(registry))
            .spectrogram((Array2::zeros((2, 1)), header))
            .unwrap();
        assert_eq!(spec.observatory(), "Nowhere");
    }

    #[test]
    fn test_ilofar_and_rpw_pairs_are_dispatched() {
        let factory = SpectrogramFactory::new();

        let mut ilofar = Header::new();
        ilofar.insert("INSTRUME".into(), "ILOFAR".into());
        ilofar.insert("MODE".into(), 357i64.into());
        ilofar.insert("DATE-OBS".into(), "2021-09-08T10:00:00".into());
        ilofar.insert("CRVAL1".into(), 0.0.into());
        ilofar.insert("CDELT1".into(), 1.0.into());
        ilofar.insert("NAXIS1".into(), 2i64.into());
        let spec = factory.spectrogram((Array2::zeros((488, 2)), ilofar)).unwrap();
        assert_eq!(spec.instrument(), "ILOFAR");
        assert_eq!(spec.observatory(), "I-LOFAR");

        let mut rpw = Header::new();
        rpw.insert("TELESCOP".into(), "SOLO".into());
        let raw = RawSpectrogram::from_pair(Array2::ones((2, 2)), rpw)
            .with_column("EPOCH", vec![6.5e17, 6.5e17 + 1e8])
            .with_column("FREQUENCY", vec![375.0, 425.0])
            .with_column("SWEEP_NUM", vec![1.0, 1.0]);
        let spec = factory.spectrogram(raw).unwrap();
        assert_eq!(spec.instrument(), "RPW");
        assert_eq!(spec.observatory(), "SOLO");
        assert_eq!(spec.shape().1, 1);
    }

    #[test]
    fn test_load_joined_uses_config() {
        let mut late = callisto_header(None);
        late.insert("TIME-OBS".into(), "10:30:05".into());
        let inputs = vec![
            FactoryInput::from((Array2::zeros((3, 4)), late)),
            FactoryInput::from(callisto_pair(None)),
        ];
        let factory = SpectrogramFactory::new();
        let joined = factory.load_joined(inputs.clone()).unwrap();
        assert_eq!(joined.shape(), (3, 8));
        assert_eq!(joined.observatory(), "e-CALLISTO");

        let mut config = IngestConfig::default();
        config.join.max_gap_seconds = Some(1.0);
        let err = factory.with_config(config).load_joined(inputs).unwrap_err();
        assert!(matches!(err, SpectrogramError::GapTooLarge { .. }));
    }
}
