// MFT file record parser
// Reads one FILE record header and walks its attribute array

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, trace, warn};
use rawfs_core::RawfsError;

use crate::ntfs::attributes::Attribute;
use crate::ntfs::structures::*;

/// One MFT entry with its attributes in on-disk order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    offset: u64,
    sequence_number: u16,
    flags: u16,
    real_size: u32,
    attributes: Vec<Attribute>,
}

impl FileRecord {
    /// Parse the record at absolute `offset`. `record_size` caps the
    /// attribute walk when the END marker is missing.
    pub fn parse<R: Read + Seek>(
        reader: &mut R,
        offset: u64,
        record_size: u64,
        geometry: VolumeGeometry,
    ) -> Result<Self, RawfsError> {
        reader.seek(SeekFrom::Start(offset))?;
        let mut signature = [0u8; 4];
        reader.read_exact(&mut signature)?;
        if &signature != FILE_RECORD_SIGNATURE {
            return Err(RawfsError::Unsupported(format!(
                "no FILE record at {:#x} (signature {})",
                offset,
                hex::encode(signature)
            )));
        }

        // Update sequence array and $LogFile sequence number are not used
        reader.seek(SeekFrom::Start(offset + 0x10))?;
        let sequence_number = reader.read_u16::<LittleEndian>()?;
        let _link_count = reader.read_u16::<LittleEndian>()?;
        let first_attribute_offset = reader.read_u16::<LittleEndian>()?;
        let flags = reader.read_u16::<LittleEndian>()?;
        let real_size = reader.read_u32::<LittleEndian>()?;

        let limit = offset + (real_size as u64).min(record_size);
        let mut position = offset + first_attribute_offset as u64;
        let mut attributes = Vec::new();

        while position < limit {
            let Some(attribute) = Attribute::parse(reader, position, geometry)? else {
                trace!("END marker at {:#x}", position);
                break;
            };

            let length = attribute.record_length();
            if length == 0 {
                warn!("Zero-length {} attribute at {:#x}; ignoring the rest of the record",
                      attribute.type_code(), position);
                break;
            }

            position += length as u64;
            attributes.push(attribute);
        }

        debug!("File record at {:#x}: sequence {}, flags {:#06x}, {} attribute(s)",
               offset, sequence_number, flags, attributes.len());

        Ok(Self {
            offset,
            sequence_number,
            flags,
            real_size,
            attributes,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn sequence_number(&self) -> u16 {
        self.sequence_number
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Bytes of the record in use, as declared in its header
    pub fn real_size(&self) -> u32 {
        self.real_size
    }

    pub fn is_in_use(&self) -> bool {
        self.flags & FILE_RECORD_IN_USE != 0
    }

    pub fn is_directory(&self) -> bool {
        self.flags & FILE_RECORD_IS_DIRECTORY != 0
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// First attribute of the given type, named or not
    pub fn find(&self, type_code: AttributeType) -> Option<&Attribute> {
        self.find_all(type_code).next()
    }

    pub fn find_all(&self, type_code: AttributeType) -> impl Iterator<Item = &Attribute> {
        self.attributes
            .iter()
            .filter(move |attribute| attribute.type_code() == type_code)
    }

    /// Attribute with an exact type and name; `None` selects the unnamed one
    pub fn find_named(&self, type_code: AttributeType, name: Option<&str>) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.matches(type_code, name))
    }

    /// The unnamed $DATA stream
    pub fn data(&self) -> Option<&Attribute> {
        self.find_named(AttributeType::Data, None)
    }
}
