// Attribute content stream
// Presents an attribute's runs as one contiguous, seekable byte range.
// Sparse runs read as zeros without touching the device.

use std::io::{self, Read, Seek, SeekFrom};

use log::trace;
use rawfs_core::RawfsError;

use crate::device_reader::BlockStream;
use crate::ntfs::attributes::Attribute;
use crate::ntfs::data_runs::DataRun;

/// Cursor over the content of one attribute.
///
/// Borrows the attribute's runs and the device that backs them. The current
/// run always contains or borders `position`, and `position` never exceeds
/// the attribute's declared data size.
pub struct AttributeStream<'a, D> {
    attribute: &'a Attribute,
    device: &'a mut D,
    run: usize,
    run_offset: u64,
    position: u64,
}

impl<'a, D: BlockStream> AttributeStream<'a, D> {
    pub fn new(attribute: &'a Attribute, device: &'a mut D) -> Self {
        let mut stream = Self {
            attribute,
            device,
            run: 0,
            run_offset: 0,
            position: 0,
        };
        stream.skip_exhausted_runs();
        stream
    }

    pub fn attribute(&self) -> &Attribute {
        self.attribute
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes left before the declared data size
    pub fn remaining(&self) -> u64 {
        self.attribute.data_size().saturating_sub(self.position)
    }

    fn current_run(&self) -> Option<DataRun> {
        self.attribute.runs().get(self.run).copied()
    }

    // Step over runs that are used up (or empty) while a next run exists
    fn skip_exhausted_runs(&mut self) {
        let runs = self.attribute.runs();
        while self.run + 1 < runs.len() && self.run_offset >= runs[self.run].length {
            self.run += 1;
            self.run_offset = 0;
        }
    }
}

impl<D: BlockStream> Read for AttributeStream<'_, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if buf.is_empty() || remaining == 0 {
            return Ok(0);
        }

        let run = self.current_run().ok_or_else(|| {
            RawfsError::UnexpectedEndOfStream(format!(
                "{} attribute has no runs but declares {} bytes",
                self.attribute.type_code(),
                self.attribute.data_size()
            ))
        })?;

        let count = (buf.len() as u64)
            .min(run.length.saturating_sub(self.run_offset))
            .min(remaining) as usize;
        if count == 0 {
            return Err(RawfsError::UnexpectedEndOfStream(format!(
                "runs end at {} of {} declared bytes",
                self.position,
                self.attribute.data_size()
            ))
            .into());
        }

        let read = match run.offset {
            None => {
                buf[..count].fill(0);
                count
            }
            Some(base) => {
                let target = base.checked_add(self.run_offset).ok_or_else(|| {
                    RawfsError::OutOfRange(format!("run at {:#x} overflows the source", base))
                })?;
                self.device.seek(SeekFrom::Start(target))?;
                let read = self.device.read(&mut buf[..count])?;
                if read == 0 {
                    return Err(RawfsError::UnexpectedEndOfStream(format!(
                        "source ended at {:#x} inside a data run",
                        target
                    ))
                    .into());
                }
                read
            }
        };

        self.run_offset += read as u64;
        self.position += read as u64;
        self.skip_exhausted_runs();
        Ok(read)
    }
}

impl<D: BlockStream> Seek for AttributeStream<'_, D> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let length = self.attribute.data_size();
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => length.checked_add_signed(delta),
        };
        let target = target.filter(|target| *target <= length).ok_or_else(|| {
            RawfsError::OutOfRange(format!(
                "cannot seek to {:?} in a {} byte attribute",
                pos, length
            ))
        })?;

        let runs = self.attribute.runs();
        let uncovered = || {
            RawfsError::UnexpectedEndOfStream(format!("offset {} is not covered by any run", target))
        };
        if runs.is_empty() {
            if target != 0 {
                return Err(uncovered().into());
            }
            self.position = 0;
            return Ok(0);
        }

        // Walk one run at a time from the current run towards the target
        let mut minimum = self.position - self.run_offset;
        loop {
            let maximum = minimum + runs[self.run].length;
            if target >= maximum && self.run + 1 < runs.len() {
                self.run += 1;
                minimum = maximum;
            } else if target < minimum && self.run > 0 {
                self.run -= 1;
                minimum -= runs[self.run].length;
            } else if target >= minimum && target <= maximum {
                break;
            } else {
                return Err(uncovered().into());
            }
        }

        self.run_offset = target - minimum;
        self.position = target;
        trace!("Attribute seek to {} (run {}, offset {})", target, self.run, self.run_offset);
        Ok(target)
    }
}

impl<D: BlockStream> BlockStream for AttributeStream<'_, D> {
    fn block_size(&self) -> u32 {
        self.attribute.cluster_size()
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.attribute.data_size())
    }

    fn flush(&mut self) -> io::Result<()> {
        BlockStream::flush(&mut *self.device)
    }
}
