use thiserror::Error;

/// Result type for ingest, dispatch and join operations.
pub type Result<T> = std::result::Result<T, SpectrogramError>;

/// Errors raised while turning inputs into spectrograms or joining them.
#[derive(Error, Debug)]
pub enum SpectrogramError {
    /// No registered source matched the input after the full fallback chain.
    #[error("unsupported format: no registered source matches {input}")]
    UnsupportedFormat { input: String },

    /// Header and data block disagree, or a required field is missing.
    #[error("malformed spectrogram {input}: {reason}")]
    Malformed { input: String, reason: String },

    /// Join inputs differ in frequency axis, unit or identity.
    #[error("incompatible spectrograms: {field} differs between {first} and {second}")]
    Incompatible {
        field: &'static str,
        first: String,
        second: String,
    },

    #[error("no spectrograms to join")]
    EmptyJoin,

    #[error("no inputs given to the spectrogram factory")]
    EmptyInput,

    /// The gap between two consecutive join inputs exceeds the configured limit.
    #[error("gap of {gap_seconds:.3} s between {before} and {after} exceeds the allowed {max_seconds:.3} s")]
    GapTooLarge {
        gap_seconds: f64,
        max_seconds: f64,
        before: String,
        after: String,
    },

    /// An input needs an I/O collaborator the factory was not given.
    #[error("no {collaborator} configured to read {input}")]
    MissingCollaborator {
        collaborator: &'static str,
        input: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failure reported by an external decoder or fetcher, passed through unchanged.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl SpectrogramError {
    pub fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        SpectrogramError::Malformed {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(input: impl Into<String>) -> Self {
        SpectrogramError::UnsupportedFormat {
            input: input.into(),
        }
    }

    /// Attach the input identity to a `Malformed` error raised without one.
    pub fn with_input(self, input: &str) -> Self {
        match self {
            SpectrogramError::Malformed { reason, .. } => SpectrogramError::Malformed {
                input: input.to_string(),
                reason,
            },
            other => other,
        }
    }
}
