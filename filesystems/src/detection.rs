// Volume detection
// Sniffs the fixed header at the start of a volume and hands the source to
// the decoder of the first filesystem kind that recognizes it.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, info};
use rawfs_core::{RawfsError, ReaderConfig};

use crate::ntfs::{BootSector, NtfsVolume};
use crate::utils;

/// Bytes read from the volume start for detection
pub const HEADER_SIZE: usize = 512;

/// Filesystem kinds this crate can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilesystemKind {
    Ntfs,
}

impl FilesystemKind {
    /// Detection order; the first kind whose predicate accepts the header wins
    pub const PRIORITY: [FilesystemKind; 1] = [FilesystemKind::Ntfs];

    pub fn name(self) -> &'static str {
        match self {
            FilesystemKind::Ntfs => "ntfs",
        }
    }

    pub fn is_header_valid(self, header: &[u8]) -> bool {
        match self {
            FilesystemKind::Ntfs => BootSector::is_header_valid(header),
        }
    }

    /// Construct this kind's volume over `source`
    pub fn open<R: Read + Seek>(self, source: R, header: &[u8], offset: u64) -> Result<Volume<R>, RawfsError> {
        match self {
            FilesystemKind::Ntfs => NtfsVolume::with_header(source, header, offset).map(Volume::Ntfs),
        }
    }

    /// First kind in priority order that recognizes `header`
    pub fn detect(header: &[u8]) -> Option<FilesystemKind> {
        Self::PRIORITY
            .iter()
            .copied()
            .find(|kind| kind.is_header_valid(header))
    }
}

impl fmt::Display for FilesystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An opened volume of any supported kind
pub enum Volume<R> {
    Ntfs(NtfsVolume<R>),
}

impl Volume<File> {
    /// Open a device or image path using `config` for offset and block size
    /// policy. Failures name the path.
    pub fn open_path(path: impl AsRef<Path>, config: &ReaderConfig) -> Result<Self, RawfsError> {
        let path = path.as_ref();
        info!("Opening volume on {}", path.display());
        File::open(path)
            .map_err(RawfsError::from)
            .and_then(|file| Self::open_with(file, config))
            .map_err(|e| RawfsError::opening(path, e))
    }
}

impl<R: Read + Seek> Volume<R> {
    /// Detect and open the volume starting at the source's current position
    pub fn open(source: R) -> Result<Self, RawfsError> {
        Self::open_inner(source, false)
    }

    /// Detect and open the volume at `config.volume_offset`
    pub fn open_with(mut source: R, config: &ReaderConfig) -> Result<Self, RawfsError> {
        config.validate()?;
        source.seek(SeekFrom::Start(config.volume_offset))?;
        Self::open_inner(source, config.dump_header)
    }

    fn open_inner(mut source: R, dump_header: bool) -> Result<Self, RawfsError> {
        let offset = source.stream_position()?;
        let header = read_header(&mut source)?;
        if dump_header {
            utils::log_hexdump(&header, offset);
        }

        let kind = FilesystemKind::detect(&header)
            .ok_or_else(|| RawfsError::Unsupported("unrecognized volume type".to_string()))?;
        debug!("Detected {} volume at {:#x}", kind, offset);

        kind.open(source, &header, offset)
    }

    pub fn kind(&self) -> FilesystemKind {
        match self {
            Volume::Ntfs(_) => FilesystemKind::Ntfs,
        }
    }

    pub fn as_ntfs(&self) -> Option<&NtfsVolume<R>> {
        match self {
            Volume::Ntfs(volume) => Some(volume),
        }
    }

    pub fn as_ntfs_mut(&mut self) -> Option<&mut NtfsVolume<R>> {
        match self {
            Volume::Ntfs(volume) => Some(volume),
        }
    }

    pub fn into_inner(self) -> R {
        match self {
            Volume::Ntfs(volume) => volume.into_inner(),
        }
    }
}

/// Read the detection header without consuming the source's position
pub fn read_header<R: Read + Seek>(source: &mut R) -> Result<[u8; HEADER_SIZE], RawfsError> {
    let start = source.stream_position()?;
    let mut header = [0u8; HEADER_SIZE];
    source.read_exact(&mut header)?;
    source.seek(SeekFrom::Start(start))?;
    Ok(header)
}
