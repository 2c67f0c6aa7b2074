/// Data layer: canonical model, input extraction, dispatch and joining.
///
/// Architecture:
/// ```text
///  path / url / (data, header)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  read input → RawSpectrogram (header + data block)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ registry  │  INSTRUME → TELESCOP → signature → SourceParser
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │  Spectrogram  │  data (freq × time), axes, meta
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │   join    │  sort by start time, concatenate columns
///   └──────────┘
/// ```

pub mod error;
pub mod factory;
pub mod join;
pub mod loader;
pub mod model;
pub mod registry;
pub mod time;
