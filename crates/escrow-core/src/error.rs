//! # Error Types
//!
//! Construction and configuration errors for the foundational types.
//! Escrow state-machine rejections live in `escrow-state`.

use thiserror::Error;

/// Domain primitive validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Address string was empty or contained whitespace.
    #[error("invalid address: \"{0}\"")]
    InvalidAddress(String),

    /// Trade leg number outside the supported 1..=99 range.
    #[error("invalid trade leg {leg} for base trade {base}")]
    InvalidTradeLeg {
        /// The base trade number.
        base: u64,
        /// The rejected leg number.
        leg: u8,
    },

    /// Amount string could not be parsed as an unsigned integer.
    #[error("invalid amount: \"{0}\"")]
    InvalidAmount(String),
}

/// Errors loading or validating an [`EscrowConfig`](crate::EscrowConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path of the config file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// YAML parse failure.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A field failed domain validation.
    #[error("invalid config value: {0}")]
    Validation(#[from] ValidationError),

    /// An environment override could not be parsed.
    #[error("invalid value for {var}: \"{value}\"")]
    InvalidEnv {
        /// The environment variable name.
        var: &'static str,
        /// The raw value.
        value: String,
    },

    /// Semantically invalid configuration.
    #[error("invalid config: {0}")]
    Invalid(String),
}
