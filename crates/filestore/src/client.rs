//! Typed DBFS calls with retry and response classification

use crate::config::{LinkConfig, RetryConfig};
use crate::transport::{HttpTransport, Reply, Transport};
use crate::wire::{
    Action, AddBlockRequest, CloseRequest, CreateRequest, CreateResponse, DeleteRequest,
    ErrorBody, FileInfo, Handle, ListResponse, OUT_OF_RANGE, PathRequest, RESOURCE_DOES_NOT_EXIST,
    ReadRequest, ReadResponse,
};
use crate::{FilestoreError, Result};
use backon::BlockingRetryable;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use diagnostics::*;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Result of one range read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Decoded bytes, never empty
    Data(Vec<u8>),
    /// The offset is at or past the end of the file
    Eof,
}

/// DBFS API client over some [`Transport`]
pub struct DbfsClient<T: Transport = HttpTransport> {
    transport: T,
    retry: RetryConfig,
}

impl DbfsClient<HttpTransport> {
    /// Build an HTTP client from a validated configuration.
    pub fn connect(config: &LinkConfig) -> Result<Self> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(transport).with_retry(config.retry.clone()))
    }
}

impl<T: Transport> DbfsClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Read up to `length` bytes at `offset`.
    pub fn read(&self, path: &str, offset: u64, length: u64) -> Result<ReadOutcome> {
        let request = ReadRequest {
            path: path.to_string(),
            offset,
            length,
        };
        let response: ReadResponse = match self.call_json(Action::Read, &request) {
            Ok(response) => response,
            Err(e) if is_out_of_range(&e) => return Ok(ReadOutcome::Eof),
            Err(e) if is_not_found(&e) => return Err(FilestoreError::NotFound(path.to_string())),
            Err(e) => return Err(e),
        };

        let bytes = STANDARD.decode(response.data.as_bytes())?;
        if bytes.len() as u64 != response.bytes_read {
            return Err(FilestoreError::protocol(
                Action::Read.as_str(),
                format!(
                    "bytes_read is {} but data decodes to {} bytes",
                    response.bytes_read,
                    bytes.len()
                ),
            ));
        }
        if bytes.is_empty() {
            return Ok(ReadOutcome::Eof);
        }
        Ok(ReadOutcome::Data(bytes))
    }

    /// List the entries of a folder.
    pub fn list(&self, path: &str) -> Result<Vec<FileInfo>> {
        let request = PathRequest {
            path: path.to_string(),
        };
        match self.call_json::<_, ListResponse>(Action::List, &request) {
            Ok(listing) => Ok(listing.files),
            Err(e) if is_not_found(&e) => Err(FilestoreError::NotFound(path.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Open a write handle for `path`.
    pub fn create(&self, path: &str, overwrite: bool) -> Result<Handle> {
        let request = CreateRequest {
            path: path.to_string(),
            overwrite,
        };
        let response: CreateResponse = self.call_json(Action::Create, &request)?;
        Ok(response.handle)
    }

    /// Append an already base64-encoded block to an open handle.
    pub fn add_block(&self, handle: &Handle, data: String) -> Result<()> {
        let request = AddBlockRequest {
            handle: handle.clone(),
            data,
        };
        self.call_unit(Action::AddBlock, &request)
    }

    pub fn close(&self, handle: &Handle) -> Result<()> {
        let request = CloseRequest {
            handle: handle.clone(),
        };
        self.call_unit(Action::Close, &request)
    }

    /// Delete `path`. A path that does not exist counts as deleted.
    pub fn delete(&self, path: &str, recursive: bool) -> Result<()> {
        let request = DeleteRequest {
            path: path.to_string(),
            recursive,
        };
        match self.call_unit(Action::Delete, &request) {
            Err(e) if is_not_found(&e) => {
                debug!("delete of missing {path} ignored", path: path);
                Ok(())
            }
            other => other,
        }
    }

    fn call_unit<Req: Serialize>(&self, action: Action, request: &Req) -> Result<()> {
        let body = serde_json::to_value(request)?;
        self.send(action, &body).map(|_| ())
    }

    fn call_json<Req, Resp>(&self, action: Action, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_value(request)?;
        let reply = self.send(action, &body)?;
        serde_json::from_slice(&reply.body).map_err(|e| {
            FilestoreError::protocol(action.as_str(), format!("invalid JSON body: {e}"))
        })
    }

    /// One call, retried while the failure is transient.
    fn send(&self, action: Action, body: &serde_json::Value) -> Result<Reply> {
        let name = action.as_str();
        let attempt = || -> Result<Reply> {
            debug!("dbfs {action} request", action: name);
            let reply = self.transport.call(action, body)?;
            if reply.is_success() {
                Ok(reply)
            } else {
                Err(http_error(action, &reply))
            }
        };

        attempt
            .retry(self.retry.backoff())
            .when(|err: &FilestoreError| err.is_retryable(action))
            .notify(|err: &FilestoreError, delay: std::time::Duration| {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let error = err.to_string();
                warn!("retrying dbfs {action} in {delay_ms}ms: {error}", action: name, delay_ms: delay_ms, error: error);
            })
            .call()
    }
}

fn http_error(action: Action, reply: &Reply) -> FilestoreError {
    let body: ErrorBody = serde_json::from_slice(&reply.body).unwrap_or_else(|_| ErrorBody {
        error_code: String::new(),
        message: String::from_utf8_lossy(&reply.body).into_owned(),
    });
    FilestoreError::Http {
        action: action.as_str(),
        status: reply.status,
        code: body.error_code,
        message: body.message,
    }
}

fn is_not_found(err: &FilestoreError) -> bool {
    matches!(err, FilestoreError::Http { status, code, .. }
        if *status == 404 || code == RESOURCE_DOES_NOT_EXIST)
}

fn is_out_of_range(err: &FilestoreError) -> bool {
    matches!(err, FilestoreError::Http { status, code, .. }
        if *status == 416 || code == OUT_OF_RANGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fault, MemoryDbfs};

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            min_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[test]
    fn test_read_ranges_and_eof() {
        let dbfs = MemoryDbfs::new();
        dbfs.put_file("/f.csv", b"abcdef");
        let client = DbfsClient::new(&dbfs);

        assert_eq!(
            client.read("/f.csv", 0, 4).unwrap(),
            ReadOutcome::Data(b"abcd".to_vec())
        );
        assert_eq!(
            client.read("/f.csv", 4, 4).unwrap(),
            ReadOutcome::Data(b"ef".to_vec())
        );
        assert_eq!(client.read("/f.csv", 6, 4).unwrap(), ReadOutcome::Eof);
    }

    #[test]
    fn test_read_missing_file() {
        let dbfs = MemoryDbfs::new();
        let client = DbfsClient::new(&dbfs);
        assert!(matches!(
            client.read("/missing.csv", 0, 10),
            Err(FilestoreError::NotFound(p)) if p == "/missing.csv"
        ));
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let dbfs = MemoryDbfs::new();
        dbfs.put_file("/f.csv", b"abc");
        dbfs.inject(Action::Read, Fault::Status(503));
        dbfs.inject(Action::Read, Fault::Disconnect);
        let client = DbfsClient::new(&dbfs).with_retry(fast_retry());

        assert_eq!(
            client.read("/f.csv", 0, 10).unwrap(),
            ReadOutcome::Data(b"abc".to_vec())
        );
        assert_eq!(dbfs.calls_to(Action::Read), 3);
    }

    #[test]
    fn test_retries_are_bounded() {
        let dbfs = MemoryDbfs::new();
        dbfs.put_file("/f.csv", b"abc");
        for _ in 0..5 {
            dbfs.inject(Action::Read, Fault::Status(500));
        }
        let client = DbfsClient::new(&dbfs).with_retry(fast_retry());

        let err = client.read("/f.csv", 0, 10).unwrap_err();
        assert!(matches!(err, FilestoreError::Http { status: 500, .. }));
        assert_eq!(dbfs.calls_to(Action::Read), 3);
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let dbfs = MemoryDbfs::new();
        dbfs.put_file("/f.csv", b"abc");
        dbfs.inject(Action::Read, Fault::Status(403));
        let client = DbfsClient::new(&dbfs).with_retry(fast_retry());

        assert!(matches!(
            client.read("/f.csv", 0, 10),
            Err(FilestoreError::Http { status: 403, .. })
        ));
        assert_eq!(dbfs.calls_to(Action::Read), 1);
    }

    #[test]
    fn test_out_of_range_reply_is_eof() {
        let dbfs = MemoryDbfs::new();
        dbfs.put_file("/f.csv", b"abc");
        dbfs.inject(Action::Read, Fault::OutOfRange);
        let client = DbfsClient::new(&dbfs);
        assert_eq!(client.read("/f.csv", 3, 10).unwrap(), ReadOutcome::Eof);
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let dbfs = MemoryDbfs::new();
        let client = DbfsClient::new(&dbfs);
        client.delete("/nothing", false).unwrap();
        client.delete("/nothing", false).unwrap();
    }

    #[test]
    fn test_write_handle_lifecycle() {
        let dbfs = MemoryDbfs::new();
        let client = DbfsClient::new(&dbfs);
        let handle = client.create("/out.csv", true).unwrap();
        client.add_block(&handle, STANDARD.encode(b"a,b\n")).unwrap();
        assert!(dbfs.file("/out.csv").is_none());
        client.close(&handle).unwrap();
        assert_eq!(dbfs.file("/out.csv").unwrap(), b"a,b\n");

        // closed handles reject further appends
        let err = client.add_block(&handle, STANDARD.encode(b"x")).unwrap_err();
        assert!(matches!(err, FilestoreError::Http { status: 400, .. }));
    }
}
