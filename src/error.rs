//! Load error taxonomy.
//!
//! Every parser catches its own failures and maps them into one of the four
//! [`LoadError`] kinds before they leave the parser boundary. Texture decode
//! failures are the only kind that can also travel as a non-fatal warning
//! next to a successfully loaded asset.

use std::fmt;

use thiserror::Error;

use crate::data_structures::asset::AssetFormat;

/// The four kinds of failure a load can end in.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("unsupported format: {extension:?}")]
    UnsupportedFormat { extension: String },

    #[error("failed to parse {format} asset: {cause}")]
    ParseFailure { format: AssetFormat, cause: String },

    #[error("missing required asset: {what}")]
    MissingRequiredAsset { what: String },

    #[error("failed to decode texture {texture:?}: {cause}")]
    DecodeFailure { texture: String, cause: String },
}

impl LoadError {
    pub fn unsupported(extension: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            extension: extension.into(),
        }
    }

    /// Wraps any error (including its `source()` chain) as a parse failure.
    pub fn parse(format: AssetFormat, cause: impl fmt::Display) -> Self {
        Self::ParseFailure {
            format,
            cause: cause.to_string(),
        }
    }

    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingRequiredAsset { what: what.into() }
    }

    pub fn decode(texture: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::DecodeFailure {
            texture: texture.into(),
            cause: cause.to_string(),
        }
    }

    /// Renders an `anyhow` error with its whole context chain.
    pub fn parse_chain(format: AssetFormat, err: &anyhow::Error) -> Self {
        Self::ParseFailure {
            format,
            cause: format!("{err:#}"),
        }
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
