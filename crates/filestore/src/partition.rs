//! Download of partitioned CSV output
//!
//! Writers such as Spark save one logical table as a folder of `part-*.csv`
//! files plus an empty `_SUCCESS` marker written last. The folder is only
//! read once the marker exists.

use crate::client::DbfsClient;
use crate::config::{DownloadOptions, PartOrder};
use crate::download::download_csv;
use crate::progress::ProgressReporter;
use crate::table::Table;
use crate::transport::Transport;
use crate::wire::FileInfo;
use crate::{FilestoreError, Result};
use diagnostics::*;

pub const SUCCESS_MARKER: &str = "_SUCCESS";
pub const PART_SUFFIX: &str = ".csv";

/// Part file paths of a listing, in download order.
///
/// Fails with [`FilestoreError::Incomplete`] when the listing has no
/// completion marker.
pub fn select_parts(folder: &str, listing: &[FileInfo], order: PartOrder) -> Result<Vec<String>> {
    let complete = listing
        .iter()
        .any(|entry| !entry.is_dir && entry.path.ends_with(SUCCESS_MARKER));
    if !complete {
        return Err(FilestoreError::Incomplete {
            folder: folder.to_string(),
        });
    }

    let mut parts: Vec<String> = listing
        .iter()
        .filter(|entry| !entry.is_dir && entry.path.ends_with(PART_SUFFIX))
        .map(|entry| entry.path.clone())
        .collect();
    if order == PartOrder::ByName {
        parts.sort();
    }
    Ok(parts)
}

/// Download every part under `folder` and stack them into one table.
pub fn download_partitioned<T: Transport>(
    client: &DbfsClient<T>,
    folder: &str,
    options: &DownloadOptions,
    progress: &dyn ProgressReporter,
) -> Result<Table> {
    options.validate()?;
    let listing = client.list(folder)?;
    let parts = match select_parts(folder, &listing, options.part_order) {
        Ok(parts) => parts,
        Err(err) => {
            let error = err.to_string();
            warn!("refusing partial download: {error}", error: error);
            return Err(err);
        }
    };

    let count = parts.len();
    debug!("downloading {count} parts from {folder}", count: count, folder: folder);

    let mut tables = Vec::with_capacity(count);
    for (i, part) in parts.into_iter().enumerate() {
        progress.on_part(i + 1, count);
        let table = download_csv(client, &part, options, progress)?;
        tables.push((part, table));
    }

    let table = Table::concat(tables)?;
    let rows = table.num_rows();
    info!("loaded {rows} rows from {count} parts in {folder}", rows: rows, count: count, folder: folder);
    Ok(table)
}
