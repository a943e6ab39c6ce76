// NTFS data run decoder
// Decodes the mapping-pairs array of a non-resident attribute into
// absolute byte extents within the source.

use log::trace;
use rawfs_core::RawfsError;

use crate::ntfs::structures::VolumeGeometry;

/// One extent of attribute content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRun {
    /// Absolute byte offset in the source; `None` for a sparse run
    pub offset: Option<u64>,
    /// Length in bytes
    pub length: u64,
}

impl DataRun {
    pub fn is_sparse(&self) -> bool {
        self.offset.is_none()
    }
}

/// Iterator over the runs of a mapping-pairs array.
///
/// Yields each run as it is decoded. The first malformed pair yields an
/// error and ends the iteration, so everything before it is still usable.
pub struct DataRunDecoder<'a> {
    data: &'a [u8],
    position: usize,
    cluster_size: u64,
    /// Absolute byte offset of the last non-sparse run
    cumulative: i64,
    finished: bool,
}

impl<'a> DataRunDecoder<'a> {
    pub fn new(data: &'a [u8], geometry: VolumeGeometry) -> Self {
        Self {
            data,
            position: 0,
            cluster_size: geometry.cluster_size as u64,
            // Volume offsets beyond i64 are rejected on the first run
            cumulative: i64::try_from(geometry.offset).unwrap_or(i64::MIN),
            finished: false,
        }
    }

    /// Bytes of the array consumed so far
    pub fn position(&self) -> usize {
        self.position
    }

    fn decode_next(&mut self) -> Result<Option<DataRun>, RawfsError> {
        let Some(&header) = self.data.get(self.position) else {
            // Record boundary reached without a terminator
            return Ok(None);
        };
        if header == 0 {
            return Ok(None);
        }

        let length_size = (header & 0x0F) as usize;
        let offset_size = (header >> 4) as usize;
        if length_size == 0 || length_size > 8 || offset_size > 8 {
            return Err(malformed(format!("invalid pair header 0x{:02X} at byte {}", header, self.position)));
        }

        let start = self.position + 1;
        let end = start + length_size + offset_size;
        if end > self.data.len() {
            return Err(malformed(format!("pair at byte {} extends beyond the attribute", self.position)));
        }

        let clusters = read_le_unsigned(&self.data[start..start + length_size]);
        let length = clusters
            .checked_mul(self.cluster_size)
            .ok_or_else(|| malformed(format!("run of {} clusters overflows", clusters)))?;

        let offset = if offset_size == 0 {
            None
        } else {
            let delta = sign_extend(&self.data[start + length_size..end]);
            let absolute = delta
                .checked_mul(self.cluster_size as i64)
                .and_then(|bytes| self.cumulative.checked_add(bytes))
                .filter(|absolute| *absolute >= 0)
                .ok_or_else(|| malformed(format!("cluster delta {} leaves the addressable range", delta)))?;
            self.cumulative = absolute;
            Some(absolute as u64)
        };

        self.position = end;
        trace!("Data run: {} bytes at {:?}", length, offset);
        Ok(Some(DataRun { offset, length }))
    }
}

impl Iterator for DataRunDecoder<'_> {
    type Item = Result<DataRun, RawfsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.decode_next() {
            Ok(Some(run)) => Some(Ok(run)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode a whole mapping-pairs array, failing on the first malformed pair
pub fn decode_data_runs(data: &[u8], geometry: VolumeGeometry) -> Result<Vec<DataRun>, RawfsError> {
    DataRunDecoder::new(data, geometry).collect()
}

/// Sum of run lengths in bytes
pub fn total_length(runs: &[DataRun]) -> u64 {
    runs.iter().map(|run| run.length).sum()
}

fn malformed(detail: String) -> RawfsError {
    RawfsError::Unsupported(format!("malformed mapping pairs: {}", detail))
}

/// Read little-endian bytes as unsigned integer
pub fn read_le_unsigned(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .enumerate()
        .fold(0u64, |value, (i, &byte)| value | ((byte as u64) << (i * 8)))
}

/// Read little-endian bytes as a two's complement integer, extending the
/// top bit of the last byte into the unread high-order bytes
pub fn sign_extend(bytes: &[u8]) -> i64 {
    let mut buf = match bytes.last() {
        Some(&last) if last & 0x80 != 0 => [0xFFu8; 8],
        _ => [0u8; 8],
    };
    let len = bytes.len().min(8);
    buf[..len].copy_from_slice(&bytes[..len]);
    i64::from_le_bytes(buf)
}
