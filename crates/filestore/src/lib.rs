//! Chunked transfer of CSV tables to and from DBFS
//!
//! The DBFS HTTP API caps each call at about a megabyte. Downloads read a file
//! in byte ranges until the remote reports its end, and uploads append base64
//! blocks to a write handle sized to stay under that cap. Tables are Arrow
//! record batches in memory and CSV on the remote side.

pub mod buffer;
pub mod client;
pub mod config;
pub mod download;
mod error;
pub mod host;
pub mod link;
pub mod partition;
pub mod progress;
pub mod sql;
pub mod table;
pub mod testing;
pub mod transport;
pub mod upload;
pub mod wire;

pub use buffer::DownloadBuffer;
pub use client::{DbfsClient, ReadOutcome};
pub use config::{DownloadOptions, LinkConfig, PartOrder, RetryConfig, UploadOptions};
pub use download::{download_bytes, download_bytes_from, download_csv, download_csv_with_schema};
pub use error::FilestoreError;
pub use host::DbfsHost;
pub use link::FileStoreLink;
pub use partition::download_partitioned;
pub use progress::{LogProgress, NoProgress, ProgressReporter};
pub use sql::{ColumnTag, SqlLink, TableCreator, TableSpec};
pub use table::Table;
pub use transport::{HttpTransport, Reply, Transport};
pub use upload::{UploadSummary, WriteGuard, upload_table};

pub type Result<T> = std::result::Result<T, FilestoreError>;
