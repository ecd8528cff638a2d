//! Loader configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`LoaderConfig`]
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Loader configuration
///
/// ```toml
/// batch-size = 100
/// validate-only = false
/// extension = "xml"
/// recurse = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LoaderConfig {
    /// Roots to collect before saving; 0 saves each root as soon as it can
    pub batch_size: usize,
    /// Derive and validate objects without saving them
    pub validate_only: bool,
    /// Log every element and created object
    pub verbose: bool,
    /// Extension of files loaded from a directory
    pub extension: String,
    /// Descend into subdirectories
    pub recurse: bool,
}

impl LoaderConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML
    ///
    /// # Errors
    /// Returns [`ConfigError::Toml`] for malformed input or unknown keys.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file can't be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&source)
    }

    /// With batch size
    #[inline]
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// With validate-only mode
    #[inline]
    #[must_use]
    pub fn with_validate_only(mut self, validate_only: bool) -> Self {
        self.validate_only = validate_only;
        self
    }

    /// With verbose logging
    #[inline]
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// With directory file extension, without the dot
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// With subdirectory recursion
    #[inline]
    #[must_use]
    pub fn with_recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 0,
            validate_only: false,
            verbose: false,
            extension: "xml".to_owned(),
            recurse: false,
        }
    }
}
