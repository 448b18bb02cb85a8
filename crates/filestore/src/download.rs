//! Chunked download of a single remote file

use crate::buffer::DownloadBuffer;
use crate::client::{DbfsClient, ReadOutcome};
use crate::config::DownloadOptions;
use crate::progress::ProgressReporter;
use crate::table::Table;
use crate::transport::Transport;
use crate::Result;
use arrow_schema::SchemaRef;
use diagnostics::*;

/// Successive byte ranges of one remote file
///
/// Yields each non-empty range in order and stops after the range that ends
/// the file: an explicit end-of-file reply, or a read shorter than requested.
/// An error is yielded once and ends the iteration.
pub struct RangeReader<'a, T: Transport> {
    client: &'a DbfsClient<T>,
    path: String,
    offset: u64,
    batch_size: u64,
    done: bool,
}

impl<'a, T: Transport> RangeReader<'a, T> {
    pub fn new(client: &'a DbfsClient<T>, path: &str, batch_size: usize) -> Self {
        Self {
            client,
            path: path.to_string(),
            offset: 0,
            batch_size: batch_size as u64,
            done: false,
        }
    }

    #[must_use]
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Bytes consumed so far, including the starting offset
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<T: Transport> Iterator for RangeReader<'_, T> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Result<Vec<u8>>> {
        if self.done {
            return None;
        }
        match self.client.read(&self.path, self.offset, self.batch_size) {
            Ok(ReadOutcome::Data(bytes)) => {
                let n = bytes.len() as u64;
                self.offset += n;
                if n < self.batch_size {
                    self.done = true;
                }
                Some(Ok(bytes))
            }
            Ok(ReadOutcome::Eof) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Fetch the whole file at `path` into a buffer.
pub fn download_bytes<T: Transport>(
    client: &DbfsClient<T>,
    path: &str,
    options: &DownloadOptions,
    progress: &dyn ProgressReporter,
) -> Result<DownloadBuffer> {
    download_bytes_from(client, path, 0, options, progress)
}

/// Fetch the file at `path` from byte `offset` to its end.
///
/// Progress counts bytes received in this call, not the offset reached.
pub fn download_bytes_from<T: Transport>(
    client: &DbfsClient<T>,
    path: &str,
    offset: u64,
    options: &DownloadOptions,
    progress: &dyn ProgressReporter,
) -> Result<DownloadBuffer> {
    options.validate()?;
    let mut buffer = DownloadBuffer::new(options.spill_threshold);
    let mut ranges = RangeReader::new(client, path, options.batch_size).starting_at(offset);
    let mut calls = 0u64;

    for bytes in ranges.by_ref() {
        buffer.append(&bytes?)?;
        calls += 1;
        progress.on_progress(buffer.len(), None);
    }

    let bytes = ranges.offset();
    let spilled = buffer.is_spilled();
    debug!("downloaded {bytes} bytes of {path} in {calls} reads (spilled: {spilled})",
        bytes: bytes, path: path, calls: calls, spilled: spilled);
    Ok(buffer)
}

/// Download a CSV file (with header row) and parse it into a table.
///
/// Column types are inferred from the text, so values change type on the way
/// through: a text column holding `007` comes back as the integer `7`. Use
/// [`download_csv_with_schema`] when the types are known.
///
/// A zero-byte file gives an empty table.
pub fn download_csv<T: Transport>(
    client: &DbfsClient<T>,
    path: &str,
    options: &DownloadOptions,
    progress: &dyn ProgressReporter,
) -> Result<Table> {
    let buffer = download_bytes(client, path, options, progress)?;
    let table = Table::read_csv(buffer.into_reader()?)?;

    let rows = table.num_rows();
    info!("loaded {rows} rows from {path}", rows: rows, path: path);
    Ok(table)
}

/// Download a CSV file (with header row) and parse it as `schema`.
///
/// A zero-byte file gives a table with `schema` and no rows.
pub fn download_csv_with_schema<T: Transport>(
    client: &DbfsClient<T>,
    path: &str,
    schema: SchemaRef,
    options: &DownloadOptions,
    progress: &dyn ProgressReporter,
) -> Result<Table> {
    let buffer = download_bytes(client, path, options, progress)?;
    let table = if buffer.is_empty() {
        Table::try_new(schema, Vec::new())?
    } else {
        Table::read_csv_with_schema(buffer.into_reader()?, schema)?
    };

    let rows = table.num_rows();
    info!("loaded {rows} rows from {path}", rows: rows, path: path);
    Ok(table)
}
