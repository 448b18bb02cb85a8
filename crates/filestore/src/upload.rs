//! Chunked upload of a table as CSV
//!
//! The write API takes base64 blocks appended to a handle, and a file only
//! becomes readable once the handle is closed. Rows are sent in consecutive
//! ranges sized from a one-row sample so that each encoded block lands near
//! `chunk_target`; any block still above `chunk_ceiling` is halved until it
//! fits.

use crate::client::DbfsClient;
use crate::config::UploadOptions;
use crate::progress::ProgressReporter;
use crate::table::Table;
use crate::transport::Transport;
use crate::wire::Handle;
use crate::{FilestoreError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use diagnostics::*;

/// Length of the base64 encoding of `raw` bytes
pub fn encoded_len(raw: usize) -> usize {
    raw.div_ceil(3) * 4
}

/// Rows per block such that a block of rows like the first one encodes to
/// at most `target` bytes. Never less than one.
pub fn rows_per_chunk(table: &Table, target: usize) -> Result<usize> {
    if table.num_rows() == 0 {
        return Ok(1);
    }
    let sample = encoded_len(table.rows_csv(0, 1)?.len()).max(1);
    Ok((target / sample).max(1))
}

/// One encoded block of consecutive rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub first_row: usize,
    pub rows: usize,
    /// Base64 of the rows' CSV text, no header
    pub data: String,
}

/// Encoded row blocks of a table, in row order
pub struct Chunks<'a> {
    table: &'a Table,
    next_row: usize,
    rows_per_chunk: usize,
    ceiling: usize,
    failed: bool,
}

impl<'a> Chunks<'a> {
    pub fn new(table: &'a Table, rows_per_chunk: usize, ceiling: usize) -> Self {
        Self {
            table,
            next_row: 0,
            rows_per_chunk: rows_per_chunk.max(1),
            ceiling,
            failed: false,
        }
    }

    fn encode_next(&mut self) -> Result<Chunk> {
        let first_row = self.next_row;
        let mut rows = self.rows_per_chunk.min(self.table.num_rows() - first_row);
        loop {
            let raw = self.table.rows_csv(first_row, rows)?;
            let encoded = encoded_len(raw.len());
            if encoded <= self.ceiling {
                self.next_row += rows;
                return Ok(Chunk {
                    first_row,
                    rows,
                    data: STANDARD.encode(raw),
                });
            }
            if rows == 1 {
                return Err(FilestoreError::RowTooLarge {
                    what: format!("row {first_row}"),
                    encoded,
                    ceiling: self.ceiling,
                });
            }
            debug!("block of {rows} rows at {first_row} encodes to {encoded} bytes, halving",
                rows: rows, first_row: first_row, encoded: encoded);
            rows /= 2;
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Result<Chunk>> {
        if self.failed || self.next_row >= self.table.num_rows() {
            return None;
        }
        let chunk = self.encode_next();
        self.failed = chunk.is_err();
        Some(chunk)
    }
}

/// An open write handle
///
/// Dropping the guard without [`WriteGuard::commit`] aborts the upload:
/// the handle is closed and the destination path deleted. Closing commits
/// whatever was appended, so between the close and the delete the truncated
/// file is readable, and it stays readable if the delete fails. That failure
/// is logged at error level; the caller only sees the original error.
///
/// Closing consumes the guard, so nothing can be appended to a closed handle.
pub struct WriteGuard<'a, T: Transport> {
    client: &'a DbfsClient<T>,
    path: String,
    handle: Option<Handle>,
}

impl<'a, T: Transport> WriteGuard<'a, T> {
    /// Create (or overwrite) `path` and hold its handle.
    pub fn create(client: &'a DbfsClient<T>, path: &str) -> Result<Self> {
        let handle = client.create(path, true)?;
        let id = handle.to_string();
        debug!("opened handle {id} for {path}", id: id.as_str(), path: path);
        Ok(Self {
            client,
            path: path.to_string(),
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn append(&mut self, data: String) -> Result<()> {
        let Some(handle) = &self.handle else {
            return Err(FilestoreError::protocol("add-block", "handle already released"));
        };
        self.client.add_block(handle, data)
    }

    /// Close the handle, making the file visible.
    pub fn commit(mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        if let Err(err) = self.client.close(&handle) {
            self.remove_destination();
            return Err(err);
        }
        Ok(())
    }

    fn abort(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let path = self.path.as_str();
        warn!("aborting upload to {path}", path: path);
        if let Err(err) = self.client.close(&handle) {
            let error = err.to_string();
            warn!("closing handle for {path} during abort failed: {error}", path: path, error: error);
        }
        self.remove_destination();
    }

    fn remove_destination(&self) {
        if let Err(err) = self.client.delete(&self.path, false) {
            let path = self.path.as_str();
            let error = err.to_string();
            error!("could not delete partial upload {path}: {error}", path: path, error: error);
        }
    }
}

impl<T: Transport> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.abort();
    }
}

/// What a finished upload sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub rows: usize,
    /// Blocks appended, header block included
    pub blocks: usize,
    /// Encoded bytes appended
    pub bytes: usize,
}

/// Upload `table` as CSV to `path`, replacing any existing file.
///
/// Size limits on the header are checked before anything is sent, so such a
/// failure leaves an existing file untouched. On failure after the handle was
/// opened, the partial file is removed (see [`WriteGuard`]) and the cause is
/// returned inside [`FilestoreError::PartialUpload`].
pub fn upload_table<T: Transport>(
    client: &DbfsClient<T>,
    table: &Table,
    path: &str,
    options: &UploadOptions,
    progress: &dyn ProgressReporter,
) -> Result<UploadSummary> {
    options.validate()?;
    // checked before create, which would replace any file at `path`
    let header = header_block(table, options)?;
    let rows_per_chunk = rows_per_chunk(table, options.chunk_target)?;
    let total = table.num_rows();
    debug!("uploading {total} rows to {path}, {rows_per_chunk} rows per block",
        total: total, path: path, rows_per_chunk: rows_per_chunk);

    let mut guard = WriteGuard::create(client, path)?;
    let mut summary = UploadSummary {
        rows: 0,
        blocks: 0,
        bytes: 0,
    };

    let sent = send_blocks(&mut guard, header, table, rows_per_chunk, options, progress, &mut summary)
        .and_then(|()| guard.commit());
    if let Err(err) = sent {
        return Err(FilestoreError::PartialUpload {
            path: path.to_string(),
            rows_sent: summary.rows,
            source: Box::new(err),
        });
    }

    info!("uploaded {rows} rows to {path} in {blocks} blocks",
        rows: summary.rows, path: path, blocks: summary.blocks);
    Ok(summary)
}

/// Encoded header line, or `None` when no header is sent.
fn header_block(table: &Table, options: &UploadOptions) -> Result<Option<String>> {
    if !options.headers {
        return Ok(None);
    }
    let header = table.header_csv()?;
    if header.is_empty() {
        return Ok(None);
    }
    let encoded = encoded_len(header.len());
    if encoded > options.chunk_ceiling {
        return Err(FilestoreError::RowTooLarge {
            what: "header".to_string(),
            encoded,
            ceiling: options.chunk_ceiling,
        });
    }
    Ok(Some(STANDARD.encode(header)))
}

fn send_blocks<T: Transport>(
    guard: &mut WriteGuard<'_, T>,
    header: Option<String>,
    table: &Table,
    rows_per_chunk: usize,
    options: &UploadOptions,
    progress: &dyn ProgressReporter,
    summary: &mut UploadSummary,
) -> Result<()> {
    if let Some(header) = header {
        let bytes = header.len();
        guard.append(header)?;
        summary.blocks += 1;
        summary.bytes += bytes;
    }

    let total = table.num_rows() as u64;
    for chunk in Chunks::new(table, rows_per_chunk, options.chunk_ceiling) {
        let chunk = chunk?;
        let bytes = chunk.data.len();
        guard.append(chunk.data)?;
        summary.rows += chunk.rows;
        summary.blocks += 1;
        summary.bytes += bytes;
        progress.on_progress(summary.rows as u64, Some(total));
    }
    Ok(())
}
