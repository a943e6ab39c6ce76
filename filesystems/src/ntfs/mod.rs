// NTFS support
// Read-only decoding of the boot sector, MFT records and attribute content

pub mod structures;
pub mod boot_sector;
pub mod data_runs;
pub mod attributes;
pub mod mft;
pub mod stream;
pub mod volume;

// Re-export main types
pub use attributes::Attribute;
pub use boot_sector::BootSector;
pub use data_runs::{DataRun, DataRunDecoder};
pub use mft::FileRecord;
pub use stream::AttributeStream;
pub use structures::{AttributeType, VolumeGeometry};
pub use volume::{MftLocation, NtfsVolume};
