//! Filestore facade bound to one client and its default options

use crate::client::DbfsClient;
use crate::config::{DownloadOptions, LinkConfig, UploadOptions};
use crate::download::{download_csv, download_csv_with_schema};
use crate::partition::download_partitioned;
use crate::progress::ProgressReporter;
use crate::table::Table;
use crate::transport::{HttpTransport, Transport};
use crate::upload::{UploadSummary, upload_table};
use crate::Result;
use arrow_schema::SchemaRef;
use diagnostics::*;

/// Loads, uploads and deletes tables on one DBFS instance
pub struct FileStoreLink<T: Transport = HttpTransport> {
    client: DbfsClient<T>,
    download: DownloadOptions,
    upload: UploadOptions,
}

impl FileStoreLink<HttpTransport> {
    /// Validate `config` and connect over HTTP.
    pub fn connect(config: &LinkConfig) -> Result<Self> {
        config.validate()?;
        let client = DbfsClient::connect(config)?;
        let host = client.transport().host().to_string();
        debug!("linked to {host}", host: host);
        Ok(Self {
            client,
            download: config.download.clone(),
            upload: config.upload.clone(),
        })
    }
}

impl<T: Transport> FileStoreLink<T> {
    /// Link over an existing client with default options.
    pub fn new(client: DbfsClient<T>) -> Self {
        Self {
            client,
            download: DownloadOptions::default(),
            upload: UploadOptions::default(),
        }
    }

    #[must_use]
    pub fn with_download_options(mut self, options: DownloadOptions) -> Self {
        self.download = options;
        self
    }

    #[must_use]
    pub fn with_upload_options(mut self, options: UploadOptions) -> Self {
        self.upload = options;
        self
    }

    pub fn client(&self) -> &DbfsClient<T> {
        &self.client
    }

    pub fn upload_options(&self) -> &UploadOptions {
        &self.upload
    }

    /// Download one CSV file with a header row.
    ///
    /// Column types are inferred, so text such as `007` loads as the integer
    /// `7`. [`FileStoreLink::load_csv_with_schema`] keeps declared types.
    pub fn load_csv(&self, path: &str, progress: &dyn ProgressReporter) -> Result<Table> {
        download_csv(&self.client, path, &self.download, progress)
    }

    pub fn load_csv_with_schema(
        &self,
        path: &str,
        schema: SchemaRef,
        progress: &dyn ProgressReporter,
    ) -> Result<Table> {
        download_csv_with_schema(&self.client, path, schema, &self.download, progress)
    }

    /// Download a folder of CSV parts guarded by a `_SUCCESS` marker.
    pub fn load_partitioned(&self, folder: &str, progress: &dyn ProgressReporter) -> Result<Table> {
        download_partitioned(&self.client, folder, &self.download, progress)
    }

    pub fn upload_table(
        &self,
        table: &Table,
        path: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<UploadSummary> {
        upload_table(&self.client, table, path, &self.upload, progress)
    }

    /// Remove `path`. Missing paths are not an error.
    pub fn delete_file(&self, path: &str, recursive: bool) -> Result<()> {
        self.client.delete(path, recursive)?;
        info!("deleted {path}", path: path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::testing::MemoryDbfs;
    use arrow_schema::{DataType, Field, Schema};
    use std::io::Cursor;
    use std::sync::Arc;

    #[test]
    fn test_link_round_trip() {
        let dbfs = MemoryDbfs::new();
        let link = FileStoreLink::new(DbfsClient::new(&dbfs)).with_download_options(DownloadOptions {
            batch_size: 7,
            ..DownloadOptions::default()
        });
        let table =
            Table::read_csv(Cursor::new(b"city,temp\nOslo,3.5\nLima,19.25\n".to_vec())).unwrap();

        link.upload_table(&table, "/FileStore/df/t.csv", &NoProgress).unwrap();
        let loaded = link.load_csv("/FileStore/df/t.csv", &NoProgress).unwrap();
        assert_eq!(loaded, table);

        link.delete_file("/FileStore/df/t.csv", false).unwrap();
        link.delete_file("/FileStore/df/t.csv", false).unwrap();
        assert!(dbfs.paths().is_empty());
    }

    #[test]
    fn test_load_with_schema_keeps_leading_zeros() {
        let dbfs = MemoryDbfs::new();
        let link = FileStoreLink::new(DbfsClient::new(&dbfs));
        let schema = Arc::new(Schema::new(vec![Field::new("zip", DataType::Utf8, true)]));
        let table = Table::read_csv_with_schema(
            Cursor::new(b"zip\n02134\n".to_vec()),
            schema.clone(),
        )
        .unwrap();

        link.upload_table(&table, "/zips.csv", &NoProgress).unwrap();
        assert_eq!(link.load_csv_with_schema("/zips.csv", schema, &NoProgress).unwrap(), table);
        assert_ne!(link.load_csv("/zips.csv", &NoProgress).unwrap(), table);
    }

    #[test]
    fn test_recursive_delete() {
        let dbfs = MemoryDbfs::new();
        dbfs.put_file("/out/_SUCCESS", b"");
        dbfs.put_file("/out/part-0001.csv", b"a\n1\n");
        dbfs.put_file("/keep.csv", b"a\n1\n");
        let link = FileStoreLink::new(DbfsClient::new(&dbfs));

        assert!(link.delete_file("/out", false).is_err());
        link.delete_file("/out", true).unwrap();
        assert_eq!(dbfs.paths(), vec!["/keep.csv"]);
    }

    #[test]
    fn test_invalid_upload_options_rejected() {
        let dbfs = MemoryDbfs::new();
        let link = FileStoreLink::new(DbfsClient::new(&dbfs)).with_upload_options(UploadOptions {
            chunk_target: 0,
            ..UploadOptions::default()
        });
        assert!(link.upload_table(&Table::empty(), "/x.csv", &NoProgress).is_err());
        assert!(dbfs.calls().is_empty());
    }
}
