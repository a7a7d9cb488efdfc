//! CLI configuration.
//!
//! Reads configuration from environment variables:
//! - `TEXGRAPH_TEXTURE_SIZE`: edge length of rendered textures (default: 64)
//! - `TEXGRAPH_DOCUMENT`: graph document to render when none is given
//!
//! Command-line flags take precedence over the environment.

use std::path::PathBuf;

use crate::error::CliError;

pub const DEFAULT_TEXTURE_SIZE: u32 = 64;
pub const MAX_TEXTURE_SIZE: u32 = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub texture_size: u32,
    pub document: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, CliError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CliError> {
        let texture_size = match lookup("TEXGRAPH_TEXTURE_SIZE") {
            Some(raw) => parse_size("TEXGRAPH_TEXTURE_SIZE", &raw)?,
            None => DEFAULT_TEXTURE_SIZE,
        };
        let document = lookup("TEXGRAPH_DOCUMENT")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        Ok(Config {
            texture_size,
            document,
        })
    }

    /// Applies command-line overrides.
    pub fn with_overrides(mut self, texture_size: Option<u32>, document: Option<PathBuf>) -> Result<Self, CliError> {
        if let Some(size) = texture_size {
            self.texture_size = check_size("--size", size)?;
        }
        if document.is_some() {
            self.document = document;
        }
        Ok(self)
    }
}

fn parse_size(key: &str, raw: &str) -> Result<u32, CliError> {
    let size = raw.trim().parse::<u32>().map_err(|e| CliError::Config {
        key: key.to_string(),
        reason: format!("'{}' is not a valid size: {}", raw, e),
    })?;
    check_size(key, size)
}

fn check_size(key: &str, size: u32) -> Result<u32, CliError> {
    if size == 0 || size > MAX_TEXTURE_SIZE {
        return Err(CliError::Config {
            key: key.to_string(),
            reason: format!("size must be between 1 and {}, got {}", MAX_TEXTURE_SIZE, size),
        });
    }
    Ok(size)
}
