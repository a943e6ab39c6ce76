// Block-aligned device reading
// Raw devices only accept reads that start on a block boundary and span
// whole blocks. This reader buffers one block at a time and keeps every
// read and seek it issues to the underlying source block-aligned.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use log::trace;
use rawfs_core::RawfsError;

/// Capability shared by the aligned device and attribute content streams
pub trait BlockStream: Read + Seek {
    /// Granularity, in bytes, of the reads issued underneath this stream
    fn block_size(&self) -> u32;

    /// Total length of the stream in bytes
    fn len(&mut self) -> io::Result<u64>;

    /// Discard any buffered bytes without repositioning the source
    fn flush(&mut self) -> io::Result<()>;

    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(RawfsError::UnsupportedOperation("writing is not supported".to_string()).into())
    }

    fn set_len(&mut self, _len: u64) -> io::Result<()> {
        Err(RawfsError::UnsupportedOperation("truncation is not supported".to_string()).into())
    }
}

/// A read-only view of a byte source that only ever touches it in
/// block-sized, block-aligned units.
///
/// The reader owns a single buffer of `block_size` bytes holding the source
/// range starting at `window_start`. `position` is the cursor inside the
/// buffer and `capacity` the number of valid bytes in it, so
/// `0 <= position <= capacity <= block_size` always holds. An empty window
/// may start anywhere; the next refill realigns to the block containing it.
pub struct AlignedDevice<R> {
    inner: R,
    buffer: Vec<u8>,
    window_start: u64,
    position: usize,
    capacity: usize,
    /// Where `inner` currently sits. Tracked here so seeks inside the
    /// buffered window need no source I/O.
    source_position: u64,
}

impl AlignedDevice<File> {
    /// Open a block device or image file read-only
    pub fn open(path: impl AsRef<Path>, block_size: u32) -> Result<Self, RawfsError> {
        let path = path.as_ref();
        trace!("Opening {} with {} byte blocks", path.display(), block_size);
        let file = OpenOptions::new().read(true).open(path)?;
        Self::new(file, block_size)
    }
}

impl<R: Seek> AlignedDevice<R> {
    /// Wrap `inner`; the logical cursor starts at the source's current
    /// position, which need not be block aligned. No I/O is issued.
    pub fn new(mut inner: R, block_size: u32) -> Result<Self, RawfsError> {
        if block_size == 0 {
            return Err(RawfsError::OutOfRange("block size must be greater than 0".to_string()));
        }

        let source_position = inner
            .stream_position()
            .map_err(|e| RawfsError::Unsupported(format!("seeking is not supported: {}", e)))?;

        Ok(Self {
            inner,
            buffer: vec![0u8; block_size as usize],
            window_start: source_position,
            position: 0,
            capacity: 0,
            source_position,
        })
    }

    // Move the source only when it is not already at `aligned`
    fn reposition(&mut self, aligned: u64) -> io::Result<()> {
        if self.source_position != aligned {
            self.inner.seek(SeekFrom::Start(aligned))?;
            self.source_position = aligned;
        }
        Ok(())
    }
}

impl<R> AlignedDevice<R> {
    pub fn block_size(&self) -> u32 {
        self.buffer.len() as u32
    }

    /// Buffered bytes not yet consumed
    pub fn buffer(&self) -> &[u8] {
        &self.buffer[self.position..self.capacity]
    }

    /// Logical cursor position, computed without touching the source
    pub fn position(&self) -> u64 {
        self.window_start + self.position as u64
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Moving the source through this reference desynchronizes the buffer;
    /// call `flush` and seek afterwards.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn empty_window_at(&mut self, offset: u64) {
        self.window_start = offset;
        self.position = 0;
        self.capacity = 0;
    }
}

impl<R: Read + Seek> AlignedDevice<R> {
    /// Load the block containing the cursor once the buffer is used up
    fn fill_buffer(&mut self) -> io::Result<()> {
        if self.position < self.capacity {
            return Ok(());
        }

        let logical = self.position();
        let aligned = logical - logical % self.buffer.len() as u64;
        self.reposition(aligned)?;

        let read = self.inner.read(&mut self.buffer)?;
        self.source_position += read as u64;

        let skip = (logical - aligned) as usize;
        if skip > read {
            // The cursor lies past the end of the source
            self.empty_window_at(logical);
        } else {
            self.window_start = aligned;
            self.capacity = read;
            self.position = skip;
        }
        Ok(())
    }
}

impl<R: Read + Seek> Read for AlignedDevice<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let block_size = self.buffer.len();
        let logical = self.position();

        // Nothing buffered, cursor on a block boundary and the request covers
        // several blocks: read the whole blocks straight into the caller's buffer
        if self.position == self.capacity && buf.len() > block_size && logical % block_size as u64 == 0 {
            let aligned = buf.len() - buf.len() % block_size;
            self.reposition(logical)?;
            let read = self.inner.read(&mut buf[..aligned])?;
            self.source_position += read as u64;
            self.empty_window_at(logical + read as u64);
            trace!("Direct read of {} bytes ({} requested)", read, aligned);
            return Ok(read);
        }

        self.fill_buffer()?;
        let read = (self.capacity - self.position).min(buf.len());
        buf[..read].copy_from_slice(&self.buffer[self.position..self.position + read]);
        self.position += read;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for AlignedDevice<R> {
    /// Seeks inside the buffered window issue no I/O. Any other target moves
    /// the source to the start of its block, which is read only when the
    /// target lies past that start. A block-aligned target beyond the end of
    /// the source is therefore accepted (reads there return 0 bytes), while
    /// an unaligned one fails with OutOfRange and leaves the cursor where it
    /// was.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let minimum = self.window_start;
        let maximum = self.window_start + self.capacity as u64;
        let current = self.position();

        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => current.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let end = self.inner.seek(SeekFrom::End(0))?;
                self.inner.seek(SeekFrom::Start(self.source_position))?;
                end.checked_add_signed(delta)
            }
        };
        let target = target.ok_or_else(|| {
            RawfsError::OutOfRange(format!("cannot seek to {:?} from offset {}", pos, current))
        })?;

        if target == current {
            return Ok(target);
        }

        if target < minimum || target > maximum {
            let block_size = self.buffer.len() as u64;
            let aligned = target - target % block_size;
            trace!("Seek to {:#x} leaves window {:#x}..{:#x}; realigning at {:#x}",
                   target, minimum, maximum, aligned);

            self.empty_window_at(aligned);
            self.reposition(aligned)?;
            if target > aligned {
                self.fill_buffer()?;
                if target - aligned > self.capacity as u64 {
                    self.empty_window_at(current);
                    return Err(RawfsError::OutOfRange(format!(
                        "cannot seek to {:#x}: beyond the end of the source",
                        target
                    ))
                    .into());
                }
            }
        }

        self.position = (target - self.window_start) as usize;
        Ok(target)
    }
}

impl<R: Read + Seek> BlockStream for AlignedDevice<R> {
    fn block_size(&self) -> u32 {
        AlignedDevice::block_size(self)
    }

    fn len(&mut self) -> io::Result<u64> {
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(self.source_position))?;
        Ok(end)
    }

    fn flush(&mut self) -> io::Result<()> {
        let source_position = self.source_position;
        self.empty_window_at(source_position);
        Ok(())
    }
}
