// Reader configuration
// Controls how sources are opened and volumes are located inside them

use crate::RawfsError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Block size assumed when the native sector size cannot be determined.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Block size used when probing the device fails or is disabled
    pub default_block_size: u32,
    /// Ask the operating system for the native block size of the source
    pub probe_sector_size: bool,
    /// Byte offset of the filesystem inside the source
    pub volume_offset: u64,
    /// Hex-dump the volume header while sniffing the filesystem kind
    pub dump_header: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            default_block_size: DEFAULT_BLOCK_SIZE,
            probe_sector_size: true,
            volume_offset: 0,
            dump_header: false,
        }
    }
}

impl ReaderConfig {
    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RawfsError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Parse a configuration from JSON text; missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self, RawfsError> {
        let config: ReaderConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RawfsError> {
        if self.default_block_size == 0 {
            return Err(RawfsError::Configuration(
                "default_block_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
