// Common utilities for opening sources and inspecting raw bytes

use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;

use log::{debug, log_enabled, Level};
use rawfs_core::{RawfsError, ReaderConfig};

use crate::device_reader::AlignedDevice;

/// Format `bytes` as xxd-style rows of 16, addressed from `base`
pub fn hexdump(bytes: &[u8], base: u64) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let groups: Vec<String> = chunk.chunks(2).map(hex::encode).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        let _ = writeln!(out, "{:08x}: {:<39}  {}", base + row as u64 * 16, groups.join(" "), ascii);
    }
    out
}

/// Hex-dump `bytes` at debug level, one record per row
pub fn log_hexdump(bytes: &[u8], base: u64) {
    if log_enabled!(Level::Debug) {
        for line in hexdump(bytes, base).lines() {
            debug!("{}", line);
        }
    }
}

/// Ask the operating system for the preferred I/O block size of `file`
pub fn probe_sector_size(file: &File) -> Option<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        file.metadata()
            .ok()
            .and_then(|metadata| u32::try_from(metadata.blksize()).ok())
            .filter(|size| *size > 0)
    }

    #[cfg(not(unix))]
    {
        let _ = file;
        None
    }
}

/// Open `path` read-only behind an aligned device. The block size comes from
/// the native probe when enabled and available, else `default_block_size`.
pub fn open_source(path: impl AsRef<Path>, config: &ReaderConfig) -> Result<AlignedDevice<File>, RawfsError> {
    let path = path.as_ref();
    let open = || -> Result<AlignedDevice<File>, RawfsError> {
        config.validate()?;
        let file = File::open(path)?;

        let probed = if config.probe_sector_size { probe_sector_size(&file) } else { None };
        let block_size = probed.unwrap_or(config.default_block_size);
        debug!("Opening {} with {} byte blocks ({})",
               path.display(),
               block_size,
               if probed.is_some() { "probed" } else { "configured" });

        AlignedDevice::new(file, block_size)
    };
    open().map_err(|e| RawfsError::opening(path, e))
}
