// SPDX-License-Identifier: MIT
//! Builder and reader configuration

use crate::error::{Error, Result};
use crate::format::{HEADER_SIZE, MAX_FILE_SIZE};
use crate::link::LinkMode;

/// Environment variable selecting the reader's link mode
pub const LINK_MODE_ENV: &str = "LBF_LINK_MODE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Inclusive cap on the container length, at most `MAX_FILE_SIZE`
    pub max_file_size: usize,

    /// Bytes reserved up front for the working buffer
    pub initial_capacity: usize,
}

impl BuilderConfig {
    pub fn with_max_file_size(mut self, max_file_size: usize) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size > MAX_FILE_SIZE {
            return Err(Error::InvalidConfig(format!(
                "max_file_size {} exceeds format limit {}",
                self.max_file_size, MAX_FILE_SIZE
            )));
        }

        if self.max_file_size <= HEADER_SIZE {
            return Err(Error::InvalidConfig(format!(
                "max_file_size {} leaves no room past the {}-byte header",
                self.max_file_size, HEADER_SIZE
            )));
        }

        Ok(())
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            initial_capacity: HEADER_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReaderConfig {
    pub link_mode: LinkMode,
}

impl ReaderConfig {
    pub fn in_place() -> Self {
        Self {
            link_mode: LinkMode::InPlace,
        }
    }

    /// Read `LBF_LINK_MODE`, falling back to the default on absent or
    /// unparsable values
    pub fn from_env() -> Self {
        let link_mode = std::env::var(LINK_MODE_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        Self { link_mode }
    }
}
