// NTFS attribute parser
// Decodes the common attribute header plus the resident or non-resident
// tail, turning either form into a list of data runs.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};
use rawfs_core::RawfsError;

use crate::ntfs::data_runs::{total_length, DataRun, DataRunDecoder};
use crate::ntfs::structures::*;

/// One parsed attribute of a file record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    offset: u64,
    type_code: AttributeType,
    record_length: u32,
    resident: bool,
    name: Option<String>,
    flags: u16,
    instance: u16,
    data_size: u64,
    runs: Vec<DataRun>,
    cluster_size: u32,
}

impl Attribute {
    /// Parse the attribute starting at absolute `offset` in `reader`.
    ///
    /// Returns `Ok(None)` for the END marker. A malformed mapping-pairs
    /// array is not fatal: the runs decoded before the fault are kept.
    pub fn parse<R: Read + Seek>(
        reader: &mut R,
        offset: u64,
        geometry: VolumeGeometry,
    ) -> Result<Option<Self>, RawfsError> {
        reader.seek(SeekFrom::Start(offset))?;

        let type_code = reader.read_u32::<LittleEndian>()?;
        if type_code == ATTR_TYPE_END {
            return Ok(None);
        }

        let record_length = reader.read_u32::<LittleEndian>()?;
        let form = reader.read_u8()?;
        let name_length = reader.read_u8()?;
        let name_offset = reader.read_u16::<LittleEndian>()?;
        let flags = reader.read_u16::<LittleEndian>()?;
        let instance = reader.read_u16::<LittleEndian>()?;
        let resident = form == RESIDENT_FORM;

        let (data_size, runs) = if resident {
            let content_length = reader.read_u32::<LittleEndian>()?;
            let content_offset = reader.read_u16::<LittleEndian>()?;
            let run = DataRun {
                offset: Some(offset + content_offset as u64),
                length: content_length as u64,
            };
            (content_length as u64, vec![run])
        } else {
            // Lowest and highest VCN
            reader.seek(SeekFrom::Current(16))?;
            let mapping_pairs_offset = reader.read_u16::<LittleEndian>()?;
            // Compression unit, padding and allocated size
            reader.seek(SeekFrom::Current(14))?;
            let data_size = reader.read_u64::<LittleEndian>()?;

            let runs = read_mapping_pairs(reader, offset, record_length, mapping_pairs_offset, geometry)?;
            (data_size, runs)
        };

        let name = if name_length > 0 {
            reader.seek(SeekFrom::Start(offset + name_offset as u64))?;
            let mut units = vec![0u16; name_length as usize];
            reader.read_u16_into::<LittleEndian>(&mut units)?;
            Some(String::from_utf16_lossy(&units))
        } else {
            None
        };

        let attribute = Self {
            offset,
            type_code: AttributeType::from(type_code),
            record_length,
            resident,
            name,
            flags,
            instance,
            data_size,
            runs,
            cluster_size: geometry.cluster_size,
        };

        debug!("Attribute {} at {:#x}: {} bytes, {} run(s), {}",
               attribute.type_code,
               offset,
               attribute.data_size,
               attribute.runs.len(),
               if resident { "resident" } else { "non-resident" });

        Ok(Some(attribute))
    }

    /// Absolute offset of the attribute record in the source
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn type_code(&self) -> AttributeType {
        self.type_code
    }

    /// Declared size of the whole attribute record, used to find the next one
    pub fn record_length(&self) -> u32 {
        self.record_length
    }

    pub fn is_resident(&self) -> bool {
        self.resident
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & ATTR_FLAG_COMPRESSION_MASK != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & ATTR_FLAG_ENCRYPTED != 0
    }

    pub fn is_sparse(&self) -> bool {
        self.flags & ATTR_FLAG_SPARSE != 0
    }

    pub fn instance(&self) -> u16 {
        self.instance
    }

    /// Logical content length. Runs may cover more than this; the excess
    /// is cluster padding.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn runs(&self) -> &[DataRun] {
        &self.runs
    }

    pub fn cluster_size(&self) -> u32 {
        self.cluster_size
    }

    /// Bytes covered by the runs, including trailing cluster padding
    pub fn allocated_length(&self) -> u64 {
        total_length(&self.runs)
    }

    /// Map a logical content offset to an absolute source offset.
    /// `None` when the offset is past the content or inside a sparse run.
    pub fn physical_offset(&self, logical: u64) -> Option<u64> {
        if logical >= self.data_size {
            return None;
        }

        let mut start = 0u64;
        for run in &self.runs {
            if logical < start + run.length {
                return run.offset.map(|base| base + (logical - start));
            }
            start += run.length;
        }
        None
    }

    pub fn matches(&self, type_code: AttributeType, name: Option<&str>) -> bool {
        self.type_code == type_code && self.name() == name
    }
}

fn read_mapping_pairs<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    record_length: u32,
    mapping_pairs_offset: u16,
    geometry: VolumeGeometry,
) -> Result<Vec<DataRun>, RawfsError> {
    let available = record_length
        .min(MAX_ATTRIBUTE_LENGTH)
        .saturating_sub(mapping_pairs_offset as u32);
    if available == 0 {
        warn!("Attribute at {:#x}: mapping pairs at {:#x} lie outside the {} byte record",
              offset, mapping_pairs_offset, record_length);
        return Ok(Vec::new());
    }

    reader.seek(SeekFrom::Start(offset + mapping_pairs_offset as u64))?;
    let mut pairs = Vec::with_capacity(available as usize);
    reader.by_ref().take(available as u64).read_to_end(&mut pairs)?;

    let mut runs = Vec::new();
    for run in DataRunDecoder::new(&pairs, geometry) {
        match run {
            Ok(run) => runs.push(run),
            Err(e) => {
                warn!("Attribute at {:#x}: {}; keeping {} decoded run(s)", offset, e, runs.len());
                break;
            }
        }
    }
    Ok(runs)
}
