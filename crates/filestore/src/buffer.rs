//! Accumulator for downloaded bytes
//!
//! Bytes stay in memory until an optional threshold, then roll over to an
//! anonymous temporary file. The file has no name on disk and disappears when
//! the buffer is dropped, whichever way the download ends.

use crate::Result;
use std::io::{Read, Seek, Write};
use tempfile::SpooledTempFile;

pub struct DownloadBuffer {
    file: SpooledTempFile,
    len: u64,
}

impl DownloadBuffer {
    /// `spill_threshold` of `None` keeps everything in memory.
    pub fn new(spill_threshold: Option<usize>) -> Self {
        Self {
            file: SpooledTempFile::new(spill_threshold.unwrap_or(usize::MAX)),
            len: 0,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the contents moved to disk
    pub fn is_spilled(&self) -> bool {
        self.file.is_rolled()
    }

    /// Rewind and hand out the contents for reading.
    pub fn into_reader(mut self) -> Result<impl Read + Seek> {
        self.file.rewind()?;
        Ok(self.file)
    }
}
