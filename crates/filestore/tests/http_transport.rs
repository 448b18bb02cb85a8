
use anyhow::Result;
use filestore::testing::{Fault, MemoryDbfs};
use filestore::wire::Action;
use filestore::{
    DbfsClient, DbfsHost, DownloadOptions, FileStoreLink, FilestoreError, HttpTransport,
    NoProgress, ReadOutcome, RetryConfig, Table, UploadOptions,
};
use mock_dbfs::{MOCK_TOKEN, MockDbfsServer};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

fn http_client(server: &MockDbfsServer, token: &str) -> Result<DbfsClient<HttpTransport>> {
    let host = DbfsHost::from_base_url(server.base_url().parse()?)?;
    let transport = HttpTransport::new(host, token, Duration::from_secs(10))?;
    Ok(DbfsClient::new(transport).with_retry(RetryConfig {
        max_retries: 2,
        min_delay_ms: 1,
        max_delay_ms: 5,
    }))
}

#[test]
fn test_upload_and_download_over_http() -> Result<()> {
    let store = Arc::new(MemoryDbfs::new());
    let server = MockDbfsServer::start(store.clone())?;
    let link = FileStoreLink::new(http_client(&server, MOCK_TOKEN)?)
        .with_download_options(DownloadOptions {
            batch_size: 64,
            ..DownloadOptions::default()
        })
        .with_upload_options(UploadOptions {
            chunk_target: 100,
            ..UploadOptions::default()
        });

    let mut csv = String::from("station,level,flag\n");
    for i in 0..40 {
        csv.push_str(&format!("s{i},{}.5,{}\n", i * 3, i % 2 == 0));
    }
    let table = Table::read_csv(Cursor::new(csv.clone().into_bytes()))?;

    let summary = link.upload_table(&table, "/FileStore/df/levels.csv", &NoProgress)?;
    assert_eq!(summary.rows, 40);
    assert!(summary.blocks > 2);
    assert_eq!(store.file("/FileStore/df/levels.csv"), Some(csv.into_bytes()));

    let loaded = link.load_csv("/FileStore/df/levels.csv", &NoProgress)?;
    assert_eq!(loaded, table);
    assert!(store.calls_to(Action::Read) > 1);
    Ok(())
}

#[test]
fn test_error_responses_over_http() -> Result<()> {
    let store = Arc::new(MemoryDbfs::new());
    store.put_file("/x.csv", b"a\n1\n");
    let server = MockDbfsServer::start(store.clone())?;
    let client = http_client(&server, MOCK_TOKEN)?;

    assert!(matches!(
        client.read("/missing.csv", 0, 10),
        Err(FilestoreError::NotFound(path)) if path == "/missing.csv"
    ));
    assert_eq!(client.read("/x.csv", 100, 10)?, ReadOutcome::Eof);

    store.inject(Action::Read, Fault::OutOfRange);
    assert_eq!(client.read("/x.csv", 0, 10)?, ReadOutcome::Eof);

    client.delete("/missing.csv", false)?;
    Ok(())
}

#[test]
fn test_transient_status_is_retried_over_http() -> Result<()> {
    let store = Arc::new(MemoryDbfs::new());
    store.put_file("/x.csv", b"a\n1\n");
    store.inject(Action::Read, Fault::Status(503));
    let server = MockDbfsServer::start(store.clone())?;
    let client = http_client(&server, MOCK_TOKEN)?;

    assert_eq!(
        client.read("/x.csv", 0, 10)?,
        ReadOutcome::Data(b"a\n1\n".to_vec())
    );
    assert_eq!(store.calls_to(Action::Read), 2);
    Ok(())
}

#[test]
fn test_bad_token_is_not_retried() -> Result<()> {
    let store = Arc::new(MemoryDbfs::new());
    let server = MockDbfsServer::start(store.clone())?;
    let client = http_client(&server, "wrong")?;

    let err = client.list("/").unwrap_err();
    assert!(matches!(err, FilestoreError::Http { status: 401, .. }));
    assert!(!err.is_transient());
    assert!(store.calls().is_empty());
    Ok(())
}
