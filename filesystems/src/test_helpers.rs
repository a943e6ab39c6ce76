// Test helpers for NTFS decoding
// Builds synthetic volumes in memory, instruments byte sources and
// captures log output. Integration tests include this file by path.
#![allow(dead_code)]

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::{Mutex, OnceLock};
use std::thread::{self, ThreadId};

use log::{Level, LevelFilter, Log, Metadata, Record};

pub const CLUSTER_SIZE: u64 = 4096;
pub const MFT_LCN: u64 = 4;
pub const BACKUP_MFT_LCN: u64 = 8;
pub const RECORD_SIZE: u64 = 4096;
pub const MFT_OFFSET: u64 = MFT_LCN * CLUSTER_SIZE;
pub const BACKUP_MFT_OFFSET: u64 = BACKUP_MFT_LCN * CLUSTER_SIZE;
pub const IMAGE_CLUSTERS: u64 = 24;

pub const HELLO_TEXT: &[u8] = b"Hello from a resident $DATA attribute!";
pub const ZONE_TEXT: &[u8] = b"[ZoneTransfer]\r\nZoneId=3\r\n";

/// Logical size of the fragmented file in record 2: two clusters at LCN 20,
/// one sparse cluster, then part of a cluster at LCN 12.
pub const FRAGMENTED_SIZE: u64 = 3 * CLUSTER_SIZE + 1000;

/// One operation issued to a `CountingSource`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOp {
    Read { offset: u64, len: usize },
    Seek { to: u64 },
}

/// In-memory byte source that records every read and seek issued to it
#[derive(Debug)]
pub struct CountingSource {
    inner: Cursor<Vec<u8>>,
    ops: Vec<SourceOp>,
}

impl CountingSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: Cursor::new(data),
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[SourceOp] {
        &self.ops
    }

    pub fn reads(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, SourceOp::Read { .. }))
            .count()
    }

    pub fn seeks(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, SourceOp::Seek { .. }))
            .count()
    }

    /// Number of reads whose requested range overlaps `start..end`
    pub fn reads_touching(&self, start: u64, end: u64) -> usize {
        self.ops
            .iter()
            .filter(|op| match op {
                SourceOp::Read { offset, len } => *offset < end && offset + *len as u64 > start,
                SourceOp::Seek { .. } => false,
            })
            .count()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

impl Read for CountingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let offset = self.inner.position();
        self.ops.push(SourceOp::Read {
            offset,
            len: buf.len(),
        });
        self.inner.read(buf)
    }
}

impl Seek for CountingSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let to = self.inner.seek(pos)?;
        self.ops.push(SourceOp::Seek { to });
        Ok(to)
    }

    // Querying the position is bookkeeping, not device I/O
    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.inner.position())
    }
}

/// Logger that remembers warnings per test thread and forwards everything
/// to env_logger, so `RUST_LOG` still works while tests run
pub struct CaptureLogger {
    warnings: Mutex<Vec<(ThreadId, String)>>,
    inner: env_logger::Logger,
}

static LOGGER: OnceLock<CaptureLogger> = OnceLock::new();

/// Install the capturing logger (idempotent)
pub fn init_logging() -> &'static CaptureLogger {
    let logger = LOGGER.get_or_init(|| CaptureLogger {
        warnings: Mutex::new(Vec::new()),
        inner: env_logger::Builder::from_default_env().is_test(true).build(),
    });
    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.inner.filter().max(LevelFilter::Warn));
    }
    logger
}

impl CaptureLogger {
    /// Warnings logged so far by the calling thread
    pub fn warnings(&self) -> Vec<String> {
        let current = thread::current().id();
        self.warnings
            .lock()
            .map(|records| {
                records
                    .iter()
                    .filter(|(id, _)| *id == current)
                    .map(|(_, message)| message.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if record.level() == Level::Warn {
            if let Ok(mut warnings) = self.warnings.lock() {
                warnings.push((thread::current().id(), record.args().to_string()));
            }
        }
        if self.inner.matches(record) {
            self.inner.log(record);
        }
    }

    fn flush(&self) {}
}

/// Deterministic content for every byte of the synthetic volume
pub fn pattern(absolute: u64) -> u8 {
    (absolute % 251) as u8
}

fn align8(value: usize) -> usize {
    (value + 7) & !7
}

fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

fn put_utf16(buf: &mut [u8], at: usize, units: &[u16]) {
    for (i, unit) in units.iter().enumerate() {
        put_u16(buf, at + i * 2, *unit);
    }
}

/// Copy `bytes` into `image` at `offset`, growing the image if needed
pub fn place(image: &mut Vec<u8>, offset: u64, bytes: &[u8]) {
    let start = offset as usize;
    let end = start + bytes.len();
    if image.len() < end {
        image.resize(end, 0);
    }
    image[start..end].copy_from_slice(bytes);
}

/// NTFS boot sector with the given geometry
pub fn boot_sector(
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    mft_lcn: u64,
    backup_lcn: u64,
    clusters_per_record: i8,
) -> Vec<u8> {
    let mut sector = vec![0u8; 512];
    sector[0..3].copy_from_slice(&[0xEB, 0x52, 0x90]);
    sector[3..11].copy_from_slice(b"NTFS    ");
    put_u16(&mut sector, 0x0B, bytes_per_sector);
    sector[0x0D] = sectors_per_cluster;
    sector[0x15] = 0xF8;
    put_u64(&mut sector, 0x28, 0x10000);
    put_u64(&mut sector, 0x30, mft_lcn);
    put_u64(&mut sector, 0x38, backup_lcn);
    sector[0x40] = clusters_per_record as u8;
    sector[0x44] = (-12i8) as u8;
    put_u64(&mut sector, 0x48, 0x1234_5678_9ABC_DEF0);
    sector[0x1FE] = 0x55;
    sector[0x1FF] = 0xAA;
    sector
}

/// Resident attribute record; content follows the (optional) name
pub fn resident_attribute(type_code: u32, name: &str, content: &[u8]) -> Vec<u8> {
    let name_units: Vec<u16> = name.encode_utf16().collect();
    let name_offset = 0x18;
    let content_offset = align8(name_offset + name_units.len() * 2);
    let record_length = align8(content_offset + content.len());

    let mut attr = vec![0u8; record_length];
    put_u32(&mut attr, 0x00, type_code);
    put_u32(&mut attr, 0x04, record_length as u32);
    attr[0x08] = 0;
    attr[0x09] = name_units.len() as u8;
    put_u16(&mut attr, 0x0A, name_offset as u16);
    put_u32(&mut attr, 0x10, content.len() as u32);
    put_u16(&mut attr, 0x14, content_offset as u16);
    put_utf16(&mut attr, name_offset, &name_units);
    attr[content_offset..content_offset + content.len()].copy_from_slice(content);
    attr
}

/// Non-resident attribute record; `mapping_pairs` must include its terminator
pub fn non_resident_attribute(type_code: u32, name: &str, data_size: u64, mapping_pairs: &[u8]) -> Vec<u8> {
    let name_units: Vec<u16> = name.encode_utf16().collect();
    let name_offset = 0x40;
    let pairs_offset = align8(name_offset + name_units.len() * 2);
    let record_length = align8(pairs_offset + mapping_pairs.len());
    let allocated = (data_size + CLUSTER_SIZE - 1) / CLUSTER_SIZE * CLUSTER_SIZE;

    let mut attr = vec![0u8; record_length];
    put_u32(&mut attr, 0x00, type_code);
    put_u32(&mut attr, 0x04, record_length as u32);
    attr[0x08] = 1;
    attr[0x09] = name_units.len() as u8;
    put_u16(&mut attr, 0x0A, name_offset as u16);
    put_u64(&mut attr, 0x10, 0);
    put_u64(&mut attr, 0x18, (allocated / CLUSTER_SIZE).saturating_sub(1));
    put_u16(&mut attr, 0x20, pairs_offset as u16);
    put_u64(&mut attr, 0x28, allocated);
    put_u64(&mut attr, 0x30, data_size);
    put_u64(&mut attr, 0x38, data_size);
    put_utf16(&mut attr, name_offset, &name_units);
    attr[pairs_offset..pairs_offset + mapping_pairs.len()].copy_from_slice(mapping_pairs);
    attr
}

/// Overwrite the flags field of an attribute record
pub fn with_flags(mut attr: Vec<u8>, flags: u16) -> Vec<u8> {
    put_u16(&mut attr, 0x0C, flags);
    attr
}

/// Overwrite the instance field of an attribute record
pub fn with_instance(mut attr: Vec<u8>, instance: u16) -> Vec<u8> {
    put_u16(&mut attr, 0x0E, instance);
    attr
}

fn minimal_unsigned(value: u64) -> Vec<u8> {
    let bytes = value.to_le_bytes();
    let mut len = 8;
    while len > 1 && bytes[len - 1] == 0 {
        len -= 1;
    }
    bytes[..len].to_vec()
}

fn minimal_signed(value: i64) -> Vec<u8> {
    let bytes = value.to_le_bytes();
    for len in 1..8 {
        let shift = 64 - 8 * len as u32;
        if (value << shift) >> shift == value {
            return bytes[..len].to_vec();
        }
    }
    bytes.to_vec()
}

/// Encode one mapping pair: cluster count and LCN delta (None = sparse)
pub fn encode_run(clusters: u64, delta: Option<i64>) -> Vec<u8> {
    let length = minimal_unsigned(clusters);
    let offset = delta.map(minimal_signed).unwrap_or_default();
    let mut run = vec![((offset.len() as u8) << 4) | length.len() as u8];
    run.extend_from_slice(&length);
    run.extend_from_slice(&offset);
    run
}

/// Encode a whole mapping-pairs array including the terminating zero byte
pub fn mapping_pairs(runs: &[(u64, Option<i64>)]) -> Vec<u8> {
    let mut pairs: Vec<u8> = runs
        .iter()
        .flat_map(|(clusters, delta)| encode_run(*clusters, *delta))
        .collect();
    pairs.push(0);
    pairs
}

/// $FILE_NAME content with an empty timestamp block
pub fn file_name_content(parent: u64, name: &str) -> Vec<u8> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let mut content = vec![0u8; 66 + units.len() * 2];
    put_u64(&mut content, 0, parent);
    content[64] = units.len() as u8;
    content[65] = 1;
    put_utf16(&mut content, 66, &units);
    content
}

/// FILE record holding `attributes` followed by the END marker
pub fn file_record(record_size: usize, flags: u16, attributes: &[Vec<u8>]) -> Vec<u8> {
    let mut record = vec![0u8; record_size];
    record[0..4].copy_from_slice(b"FILE");
    put_u16(&mut record, 0x04, 0x30);
    put_u16(&mut record, 0x10, 1);
    put_u16(&mut record, 0x12, 1);
    put_u16(&mut record, 0x14, 0x38);
    put_u16(&mut record, 0x16, flags);

    let mut pos = 0x38;
    for attr in attributes {
        record[pos..pos + attr.len()].copy_from_slice(attr);
        pos += attr.len();
    }
    put_u32(&mut record, pos, 0xFFFF_FFFF);
    pos += 8;
    assert!(pos <= record_size, "attributes overflow the file record");

    put_u32(&mut record, 0x18, pos as u32);
    put_u32(&mut record, 0x1C, record_size as u32);
    record
}

/// The MFT's own record: $STANDARD_INFORMATION, $FILE_NAME, $DATA over
/// four clusters at `MFT_LCN`, and a resident $BITMAP
pub fn mft_record() -> Vec<u8> {
    file_record(
        RECORD_SIZE as usize,
        0x0001,
        &[
            resident_attribute(0x10, "", &[0u8; 72]),
            resident_attribute(0x30, "", &file_name_content(5, "$MFT")),
            non_resident_attribute(0x80, "", 4 * RECORD_SIZE, &mapping_pairs(&[(4, Some(MFT_LCN as i64))])),
            resident_attribute(0xB0, "", &[0x07, 0, 0, 0, 0, 0, 0, 0]),
        ],
    )
}

/// Synthetic 96 KiB volume (512-byte sectors, 8 sectors per cluster):
///
/// * record 0: $MFT, mirrored at `BACKUP_MFT_LCN`
/// * record 1: hello.txt, resident $DATA plus a named Zone.Identifier stream
/// * record 2: fragmented.bin, runs 2 @ LCN 20, 1 sparse, 1 @ LCN 12
/// * record 3: never written
pub fn sample_image() -> Vec<u8> {
    let mut image = vec![0u8; (IMAGE_CLUSTERS * CLUSTER_SIZE) as usize];
    for lcn in [12u64, 20, 21] {
        let start = lcn * CLUSTER_SIZE;
        for abs in start..start + CLUSTER_SIZE {
            image[abs as usize] = pattern(abs);
        }
    }

    place(&mut image, 0, &boot_sector(512, 8, MFT_LCN, BACKUP_MFT_LCN, 1));

    let mft = mft_record();
    place(&mut image, MFT_OFFSET, &mft);
    place(&mut image, BACKUP_MFT_OFFSET, &mft);

    let hello = file_record(
        RECORD_SIZE as usize,
        0x0001,
        &[
            resident_attribute(0x10, "", &[0u8; 72]),
            resident_attribute(0x30, "", &file_name_content(5, "hello.txt")),
            resident_attribute(0x80, "", HELLO_TEXT),
            resident_attribute(0x80, "Zone.Identifier", ZONE_TEXT),
        ],
    );
    place(&mut image, MFT_OFFSET + RECORD_SIZE, &hello);

    let fragmented = file_record(
        RECORD_SIZE as usize,
        0x0001,
        &[
            resident_attribute(0x30, "", &file_name_content(5, "fragmented.bin")),
            with_flags(
                non_resident_attribute(
                    0x80,
                    "",
                    FRAGMENTED_SIZE,
                    &mapping_pairs(&[(2, Some(20)), (1, None), (1, Some(-8))]),
                ),
                0x8000,
            ),
        ],
    );
    place(&mut image, MFT_OFFSET + 2 * RECORD_SIZE, &fragmented);

    image
}

/// Expected content of the fragmented file in `sample_image`
pub fn fragmented_expected() -> Vec<u8> {
    (0..FRAGMENTED_SIZE)
        .map(|logical| {
            let within = logical % CLUSTER_SIZE;
            match logical / CLUSTER_SIZE {
                0 => pattern(20 * CLUSTER_SIZE + within),
                1 => pattern(21 * CLUSTER_SIZE + within),
                2 => 0,
                _ => pattern(12 * CLUSTER_SIZE + within),
            }
        })
        .collect()
}

/// Destroy the primary MFT record's signature, leaving the mirror intact
pub fn corrupt_primary_mft(image: &mut [u8]) {
    let start = MFT_OFFSET as usize;
    image[start..start + 4].copy_from_slice(b"BAAD");
}
