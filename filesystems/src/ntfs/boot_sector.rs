// NTFS boot sector decoder
// Reads the BIOS parameter block and derives cluster size and MFT location

use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use rawfs_core::RawfsError;

use crate::ntfs::structures::NTFS_OEM_TAG;

/// Decoded NTFS boot sector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub total_sectors: u64,
    pub mft_lcn: u64,
    pub mft_mirror_lcn: u64,
    pub clusters_per_mft_record: i8,
    pub clusters_per_index_buffer: i8,
    pub volume_serial: u64,
    pub cluster_size: u32,
    pub mft_record_size: u64,
}

impl BootSector {
    /// OEM tag check used by the volume registry
    pub fn is_header_valid(header: &[u8]) -> bool {
        header.len() >= 7 && &header[3..7] == NTFS_OEM_TAG
    }

    /// Parse the first sector of a volume
    pub fn parse(header: &[u8]) -> Result<Self, RawfsError> {
        if !Self::is_header_valid(header) {
            return Err(RawfsError::Unsupported("missing NTFS OEM tag".to_string()));
        }

        let mut cursor = Cursor::new(header);
        cursor.seek(SeekFrom::Start(0x0B))?;
        let bytes_per_sector = cursor.read_u16::<LittleEndian>()?;
        let sectors_per_cluster = cursor.read_u8()?;

        // Reserved sectors through hidden sectors only matter to FAT
        cursor.seek(SeekFrom::Start(0x28))?;
        let total_sectors = cursor.read_u64::<LittleEndian>()?;
        let mft_lcn = cursor.read_u64::<LittleEndian>()?;
        let mft_mirror_lcn = cursor.read_u64::<LittleEndian>()?;
        let clusters_per_mft_record = cursor.read_i8()?;

        let mut padding = [0u8; 3];
        cursor.read_exact(&mut padding)?;
        let clusters_per_index_buffer = cursor.read_i8()?;
        cursor.read_exact(&mut padding)?;
        let volume_serial = cursor.read_u64::<LittleEndian>()?;

        let cluster_size = bytes_per_sector as u32 * sectors_per_cluster as u32;
        if cluster_size == 0 {
            return Err(RawfsError::Unsupported(format!(
                "invalid geometry: {} bytes per sector, {} sectors per cluster",
                bytes_per_sector, sectors_per_cluster
            )));
        }

        let mft_record_size = decode_record_size(clusters_per_mft_record, cluster_size).ok_or_else(|| {
            RawfsError::Unsupported(format!("invalid clusters per MFT record: {}", clusters_per_mft_record))
        })?;

        let boot_sector = Self {
            bytes_per_sector,
            sectors_per_cluster,
            total_sectors,
            mft_lcn,
            mft_mirror_lcn,
            clusters_per_mft_record,
            clusters_per_index_buffer,
            volume_serial,
            cluster_size,
            mft_record_size,
        };

        // Both MFT locations must be addressable
        boot_sector.checked_cluster_offset(mft_lcn)?;
        boot_sector.checked_cluster_offset(mft_mirror_lcn)?;

        debug!("NTFS geometry: {} bytes/sector, {} sectors/cluster, cluster size {}",
               bytes_per_sector, sectors_per_cluster, cluster_size);
        debug!("MFT at cluster {}, mirror at cluster {}, record size {}",
               mft_lcn, mft_mirror_lcn, mft_record_size);

        Ok(boot_sector)
    }

    /// Byte offset of the MFT relative to the volume start
    pub fn mft_offset(&self) -> u64 {
        self.mft_lcn * self.cluster_size as u64
    }

    /// Byte offset of the MFT mirror relative to the volume start
    pub fn backup_mft_offset(&self) -> u64 {
        self.mft_mirror_lcn * self.cluster_size as u64
    }

    pub fn index_buffer_size(&self) -> Option<u64> {
        decode_record_size(self.clusters_per_index_buffer, self.cluster_size)
    }

    pub fn volume_size(&self) -> u64 {
        self.total_sectors.saturating_mul(self.bytes_per_sector as u64)
    }

    fn checked_cluster_offset(&self, lcn: u64) -> Result<u64, RawfsError> {
        lcn.checked_mul(self.cluster_size as u64)
            .ok_or_else(|| RawfsError::Unsupported(format!("cluster {} is not addressable", lcn)))
    }
}

/// Decode the signed size byte used for MFT records and index buffers:
/// positive counts clusters, otherwise the size is 2^(-value) bytes.
pub fn decode_record_size(encoded: i8, cluster_size: u32) -> Option<u64> {
    if encoded > 0 {
        Some(encoded as u64 * cluster_size as u64)
    } else {
        let shift = -(encoded as i32) as u32;
        1u64.checked_shl(shift)
    }
}
