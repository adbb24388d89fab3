use thiserror::Error;

/// Core error type for otelweave operations.
///
/// Per-edge problems (missing packages, unreadable descriptors,
/// unmatched versions) are deliberately not represented here: they fail
/// open and the import passes through unmodified. Only construction-time
/// misconfiguration surfaces as an error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid plugin configuration: {reason}")]
    Config { reason: String },

    #[error("invalid version range '{range}' for instrumentation '{name}': {source}")]
    VersionRange {
        name: String,
        range: String,
        #[source]
        source: semver::Error,
    },
}

impl Error {
    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}
