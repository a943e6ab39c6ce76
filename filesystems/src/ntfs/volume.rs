// NTFS volume
// Ties the boot sector, the aligned device and the MFT together

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use log::{debug, info, warn};
use rawfs_core::RawfsError;

use crate::detection::HEADER_SIZE;
use crate::device_reader::{AlignedDevice, BlockStream};
use crate::ntfs::attributes::Attribute;
use crate::ntfs::boot_sector::BootSector;
use crate::ntfs::mft::FileRecord;
use crate::ntfs::stream::AttributeStream;
use crate::ntfs::structures::{AttributeType, VolumeGeometry};

/// Which copy of the MFT's first record the volume was opened from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MftLocation {
    Primary(u64),
    Backup(u64),
}

impl MftLocation {
    /// Absolute offset of the record in the source
    pub fn offset(self) -> u64 {
        match self {
            MftLocation::Primary(offset) | MftLocation::Backup(offset) => offset,
        }
    }

    pub fn is_backup(self) -> bool {
        matches!(self, MftLocation::Backup(_))
    }
}

/// An opened NTFS volume
pub struct NtfsVolume<R> {
    device: AlignedDevice<R>,
    offset: u64,
    boot_sector: BootSector,
    mft: FileRecord,
    mft_location: MftLocation,
}

impl NtfsVolume<File> {
    /// Open an image file or block device whose first byte is the volume start
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, RawfsError> {
        let path = path.as_ref();
        File::open(path)
            .map_err(RawfsError::from)
            .and_then(Self::open)
            .map_err(|e| RawfsError::opening(path, e))
    }
}

impl<R: Read + Seek> NtfsVolume<R> {
    /// Open the volume starting at the source's current position
    pub fn open(mut source: R) -> Result<Self, RawfsError> {
        let offset = source.stream_position()?;
        let mut header = [0u8; HEADER_SIZE];
        source.read_exact(&mut header)?;
        Self::with_header(source, &header, offset)
    }

    /// Build the volume from an already-read boot sector. `offset` is where
    /// the volume starts in `source`.
    pub fn with_header(source: R, header: &[u8], offset: u64) -> Result<Self, RawfsError> {
        let boot_sector = BootSector::parse(header)?;
        let geometry = VolumeGeometry::new(offset, boot_sector.cluster_size);

        // Every MFT access from here on is cluster aligned
        let mut device = AlignedDevice::new(source, boot_sector.cluster_size)?;

        let primary = absolute(offset, boot_sector.mft_offset())?;
        let record_size = boot_sector.mft_record_size;
        let (mft, mft_location) = match FileRecord::parse(&mut device, primary, record_size, geometry) {
            Ok(mft) => (mft, MftLocation::Primary(primary)),
            Err(RawfsError::Unsupported(reason)) => {
                let backup = absolute(offset, boot_sector.backup_mft_offset())?;
                warn!("MFT record at {:#x} is unusable ({}), falling back to the mirror at {:#x}",
                      primary, reason, backup);
                let mft = FileRecord::parse(&mut device, backup, record_size, geometry)?;
                (mft, MftLocation::Backup(backup))
            }
            Err(e) => return Err(e),
        };

        info!("Opened NTFS volume at {:#x}: {} byte clusters, MFT at {:#x}{}",
              offset,
              boot_sector.cluster_size,
              mft_location.offset(),
              if mft_location.is_backup() { " (mirror)" } else { "" });

        Ok(Self {
            device,
            offset,
            boot_sector,
            mft,
            mft_location,
        })
    }

    /// Re-read the MFT record from wherever it was originally found
    pub fn refresh(&mut self) -> Result<(), RawfsError> {
        let location = self.mft_location.offset();
        let record_size = self.record_size();
        let geometry = self.geometry();

        BlockStream::flush(&mut self.device)?;
        self.mft = FileRecord::parse(&mut self.device, location, record_size, geometry)?;
        Ok(())
    }

    /// Parse MFT record `number`, located through the MFT's own $DATA runs
    pub fn read_record(&mut self, number: u64) -> Result<FileRecord, RawfsError> {
        let record_size = self.record_size();
        let geometry = self.geometry();
        let data = self
            .mft
            .data()
            .ok_or_else(|| RawfsError::Unsupported("MFT record has no unnamed $DATA attribute".to_string()))?;

        let start = number
            .checked_mul(record_size)
            .filter(|start| start.saturating_add(record_size) <= data.data_size())
            .ok_or_else(|| {
                RawfsError::OutOfRange(format!(
                    "record {} is beyond the {} byte MFT",
                    number,
                    data.data_size()
                ))
            })?;

        let location = data.physical_offset(start).ok_or_else(|| {
            RawfsError::OutOfRange(format!("record {} lies in a sparse part of the MFT", number))
        })?;
        if data.physical_offset(start + record_size - 1) != Some(location + record_size - 1) {
            return Err(RawfsError::Unsupported(format!(
                "record {} is split across MFT runs",
                number
            )));
        }

        debug!("Record {} at {:#x}", number, location);
        FileRecord::parse(&mut self.device, location, record_size, geometry)
    }

    /// Stream over the content of `attribute`
    pub fn open_stream<'a>(&'a mut self, attribute: &'a Attribute) -> AttributeStream<'a, AlignedDevice<R>> {
        AttributeStream::new(attribute, &mut self.device)
    }

    /// Read the whole content of `attribute`
    pub fn read_attribute(&mut self, attribute: &Attribute) -> Result<Vec<u8>, RawfsError> {
        let mut content = Vec::new();
        self.open_stream(attribute).read_to_end(&mut content)?;
        Ok(content)
    }

    /// Stream over one of the MFT record's own attributes
    pub fn mft_stream(&mut self, type_code: AttributeType) -> Option<AttributeStream<'_, AlignedDevice<R>>> {
        let attribute = self.mft.find_named(type_code, None)?;
        Some(AttributeStream::new(attribute, &mut self.device))
    }

    /// Absolute offset of the volume in the source
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn boot_sector(&self) -> &BootSector {
        &self.boot_sector
    }

    pub fn cluster_size(&self) -> u32 {
        self.boot_sector.cluster_size
    }

    pub fn record_size(&self) -> u64 {
        self.boot_sector.mft_record_size
    }

    pub fn geometry(&self) -> VolumeGeometry {
        VolumeGeometry::new(self.offset, self.boot_sector.cluster_size)
    }

    /// The MFT's own file record
    pub fn mft(&self) -> &FileRecord {
        &self.mft
    }

    pub fn mft_location(&self) -> MftLocation {
        self.mft_location
    }

    pub fn device(&self) -> &AlignedDevice<R> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut AlignedDevice<R> {
        &mut self.device
    }

    pub fn into_inner(self) -> R {
        self.device.into_inner()
    }
}

fn absolute(volume_offset: u64, relative: u64) -> Result<u64, RawfsError> {
    volume_offset
        .checked_add(relative)
        .ok_or_else(|| RawfsError::Unsupported(format!("offset {:#x} is not addressable", relative)))
}
