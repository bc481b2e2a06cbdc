use thiserror::Error;

/// Common error type for the exporter crates.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("metric {name} expects {expected} label values, got {actual}")]
    LabelArity {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
