// NTFS on-disk constants and shared types

use std::fmt;
use std::str::FromStr;

use rawfs_core::RawfsError;

// Signatures
pub const NTFS_OEM_TAG: &[u8; 4] = b"NTFS";
pub const FILE_RECORD_SIGNATURE: &[u8; 4] = b"FILE";

// MFT record flags
pub const FILE_RECORD_IN_USE: u16 = 0x0001;
pub const FILE_RECORD_IS_DIRECTORY: u16 = 0x0002;

// Attribute flags
pub const ATTR_FLAG_COMPRESSION_MASK: u16 = 0x00FF;
pub const ATTR_FLAG_ENCRYPTED: u16 = 0x4000;
pub const ATTR_FLAG_SPARSE: u16 = 0x8000;

pub const ATTR_TYPE_END: u32 = 0xFFFF_FFFF;

/// Form code of a resident attribute; anything else is non-resident
pub const RESIDENT_FORM: u8 = 0;

/// Upper bound on a single attribute record. Records live inside one MFT
/// entry, so anything larger is corrupt.
pub const MAX_ATTRIBUTE_LENGTH: u32 = 0x10000;

/// Attribute type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    StandardInformation,
    AttributeList,
    FileName,
    ObjectId,
    SecurityDescriptor,
    VolumeName,
    VolumeInformation,
    Data,
    IndexRoot,
    IndexAllocation,
    Bitmap,
    ReparsePoint,
    EaInformation,
    Ea,
    LoggedUtilityStream,
    End,
    Other(u32),
}

impl AttributeType {
    pub fn code(self) -> u32 {
        match self {
            AttributeType::StandardInformation => 0x10,
            AttributeType::AttributeList => 0x20,
            AttributeType::FileName => 0x30,
            AttributeType::ObjectId => 0x40,
            AttributeType::SecurityDescriptor => 0x50,
            AttributeType::VolumeName => 0x60,
            AttributeType::VolumeInformation => 0x70,
            AttributeType::Data => 0x80,
            AttributeType::IndexRoot => 0x90,
            AttributeType::IndexAllocation => 0xA0,
            AttributeType::Bitmap => 0xB0,
            AttributeType::ReparsePoint => 0xC0,
            AttributeType::EaInformation => 0xD0,
            AttributeType::Ea => 0xE0,
            AttributeType::LoggedUtilityStream => 0x100,
            AttributeType::End => ATTR_TYPE_END,
            AttributeType::Other(code) => code,
        }
    }

    /// Name as listed in $AttrDef, e.g. `$DATA`
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            AttributeType::StandardInformation => "$STANDARD_INFORMATION",
            AttributeType::AttributeList => "$ATTRIBUTE_LIST",
            AttributeType::FileName => "$FILE_NAME",
            AttributeType::ObjectId => "$OBJECT_ID",
            AttributeType::SecurityDescriptor => "$SECURITY_DESCRIPTOR",
            AttributeType::VolumeName => "$VOLUME_NAME",
            AttributeType::VolumeInformation => "$VOLUME_INFORMATION",
            AttributeType::Data => "$DATA",
            AttributeType::IndexRoot => "$INDEX_ROOT",
            AttributeType::IndexAllocation => "$INDEX_ALLOCATION",
            AttributeType::Bitmap => "$BITMAP",
            AttributeType::ReparsePoint => "$REPARSE_POINT",
            AttributeType::EaInformation => "$EA_INFORMATION",
            AttributeType::Ea => "$EA",
            AttributeType::LoggedUtilityStream => "$LOGGED_UTILITY_STREAM",
            AttributeType::End => "END",
            AttributeType::Other(_) => return None,
        };
        Some(name)
    }

    const KNOWN: [AttributeType; 16] = [
        AttributeType::StandardInformation,
        AttributeType::AttributeList,
        AttributeType::FileName,
        AttributeType::ObjectId,
        AttributeType::SecurityDescriptor,
        AttributeType::VolumeName,
        AttributeType::VolumeInformation,
        AttributeType::Data,
        AttributeType::IndexRoot,
        AttributeType::IndexAllocation,
        AttributeType::Bitmap,
        AttributeType::ReparsePoint,
        AttributeType::EaInformation,
        AttributeType::Ea,
        AttributeType::LoggedUtilityStream,
        AttributeType::End,
    ];
}

impl From<u32> for AttributeType {
    fn from(code: u32) -> Self {
        AttributeType::KNOWN
            .iter()
            .copied()
            .find(|known| known.code() == code)
            .unwrap_or(AttributeType::Other(code))
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:X}", self.code()),
        }
    }
}

/// Accepts `$DATA`, `data`, `DATA` or a hex code such as `0x80`
impl FromStr for AttributeType {
    type Err = RawfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            return u32::from_str_radix(hex, 16)
                .map(AttributeType::from)
                .map_err(|_| RawfsError::Configuration(format!("invalid attribute type code: {}", s)));
        }

        let wanted = trimmed.trim_start_matches('$').to_ascii_uppercase();
        AttributeType::KNOWN
            .iter()
            .copied()
            .find(|known| {
                known
                    .name()
                    .map_or(false, |name| name.trim_start_matches('$') == wanted)
            })
            .ok_or_else(|| RawfsError::Configuration(format!("unknown attribute type: {}", s)))
    }
}

/// Where a volume sits in its byte source and how big its clusters are.
/// Data runs are resolved against this, so every run offset is absolute
/// within the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeGeometry {
    pub offset: u64,
    pub cluster_size: u32,
}

impl VolumeGeometry {
    pub fn new(offset: u64, cluster_size: u32) -> Self {
        Self { offset, cluster_size }
    }
}
