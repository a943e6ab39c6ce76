// Raw filesystem metadata readers
// Decodes on-disk structures straight from block devices and images,
// without going through the host's filesystem driver.

pub mod detection;
pub mod device_reader;
pub mod ntfs;
pub mod utils;

#[cfg(test)]
pub mod test_helpers;

pub use detection::{FilesystemKind, Volume, HEADER_SIZE};
pub use device_reader::{AlignedDevice, BlockStream};
pub use ntfs::{Attribute, AttributeStream, AttributeType, BootSector, DataRun, FileRecord, MftLocation, NtfsVolume};
pub use rawfs_core::{RawfsError, ReaderConfig};
