//! Configuration for the general loader
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{LoaderError, Result};

/// Default event alignment boundary (bytes)
pub const DEFAULT_ALIGNMENT: u8 = 4;

/// Default cap on a single length-prefixed read (256 MB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 256 * 1024 * 1024;

/// Main configuration for a loader instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Schema Configuration
    // -------------------------------------------------------------------------
    /// Directories searched for schema includes
    pub schema_include_paths: Vec<PathBuf>,

    /// External schema files, used when the stream carries no inline schema
    pub schema_files: Vec<PathBuf>,

    // -------------------------------------------------------------------------
    // Stream Configuration
    // -------------------------------------------------------------------------
    /// Every event starts at a multiple of this many bytes from stream start
    pub alignment: u8,

    /// Largest single length-prefixed field the loader will buffer
    pub max_payload_size: u32,

    // -------------------------------------------------------------------------
    // Output Configuration
    // -------------------------------------------------------------------------
    /// Root for relative database paths
    pub output_root: PathBuf,

    /// Remove a partially built database when the load fails
    pub remove_on_failure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_include_paths: Vec::new(),
            schema_files: Vec::new(),
            alignment: DEFAULT_ALIGNMENT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            output_root: PathBuf::from("."),
            remove_on_failure: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would make a load impossible
    pub fn validate(&self) -> Result<()> {
        if self.alignment == 0 || !self.alignment.is_power_of_two() {
            return Err(LoaderError::Config(format!(
                "alignment must be a non-zero power of two, got {}",
                self.alignment
            )));
        }
        if self.max_payload_size == 0 {
            return Err(LoaderError::Config(
                "max_payload_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Split a colon-separated path list, dropping empty segments
pub fn split_paths(list: &str) -> Vec<PathBuf> {
    list.split(':')
        .filter(|segment| !segment.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Add schema include paths (colon-separated list accepted)
    pub fn schema_include_path(mut self, list: &str) -> Self {
        self.config.schema_include_paths.extend(split_paths(list));
        self
    }

    /// Add external schema files (colon-separated list accepted)
    pub fn schema_file(mut self, list: &str) -> Self {
        self.config.schema_files.extend(split_paths(list));
        self
    }

    /// Set the event alignment boundary
    pub fn alignment(mut self, bytes: u8) -> Self {
        self.config.alignment = bytes;
        self
    }

    /// Set the maximum single payload size (in bytes)
    pub fn max_payload_size(mut self, bytes: u32) -> Self {
        self.config.max_payload_size = bytes;
        self
    }

    /// Set the root directory for relative database paths
    pub fn output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_root = path.into();
        self
    }

    /// Keep or remove a partially built database on failure
    pub fn remove_on_failure(mut self, remove: bool) -> Self {
        self.config.remove_on_failure = remove;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
