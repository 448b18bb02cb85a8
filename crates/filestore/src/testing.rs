//! In-memory DBFS for tests
//!
//! [`MemoryDbfs`] implements [`Transport`] by serving the API from a map of
//! paths to bytes. It mirrors the remote behaviour the transfer code relies
//! on: blocks stay invisible until `close`, reads past the end return zero
//! bytes, missing paths answer `RESOURCE_DOES_NOT_EXIST`. Faults can be queued
//! per action, and every call is recorded.

use crate::config::{API_PAYLOAD_LIMIT, MAX_READ_LENGTH};
use crate::transport::{Reply, Transport};
use crate::wire::{
    Action, AddBlockRequest, CloseRequest, CreateRequest, DeleteRequest, FileInfo, Handle,
    INVALID_PARAMETER_VALUE, OUT_OF_RANGE, PathRequest, RESOURCE_DOES_NOT_EXIST, ReadRequest,
};
use crate::{FilestoreError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What happens to one queued call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Served normally
    Pass,
    /// Reply with this HTTP status and a generic error body
    Status(u16),
    /// Connection refused before the request reached the server
    Disconnect,
    /// The call is applied but its reply never arrives
    LostReply,
    /// `400 OUT_OF_RANGE`
    OutOfRange,
}

#[derive(Debug)]
struct OpenHandle {
    path: String,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    /// Committed files in creation order
    files: Vec<(String, Vec<u8>)>,
    handles: HashMap<i64, OpenHandle>,
    next_handle: i64,
    faults: HashMap<Action, VecDeque<Fault>>,
    calls: Vec<Action>,
    block_sizes: Vec<usize>,
}

impl State {
    fn file(&self, path: &str) -> Option<&Vec<u8>> {
        self.files.iter().find(|(p, _)| p == path).map(|(_, d)| d)
    }

    fn commit(&mut self, path: String, data: Vec<u8>) {
        match self.files.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = data,
            None => self.files.push((path, data)),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryDbfs {
    state: Mutex<State>,
}

impl MemoryDbfs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a committed file. Listing order follows insertion order.
    pub fn put_file(&self, path: &str, data: &[u8]) {
        self.lock().commit(path.to_string(), data.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().file(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().files.iter().map(|(p, _)| p.clone()).collect()
    }

    /// Queue a fault for the next call of `action`.
    pub fn inject(&self, action: Action, fault: Fault) {
        self.lock().faults.entry(action).or_default().push_back(fault);
    }

    /// Let `passes` calls of `action` through, then apply `fault`.
    pub fn inject_after(&self, action: Action, passes: usize, fault: Fault) {
        let mut state = self.lock();
        let queue = state.faults.entry(action).or_default();
        queue.extend(std::iter::repeat_n(Fault::Pass, passes));
        queue.push_back(fault);
    }

    pub fn calls(&self) -> Vec<Action> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, action: Action) -> usize {
        self.lock().calls.iter().filter(|a| **a == action).count()
    }

    /// Encoded size of every block appended successfully, in order
    pub fn block_sizes(&self) -> Vec<usize> {
        self.lock().block_sizes.clone()
    }

    pub fn open_handles(&self) -> usize {
        self.lock().handles.len()
    }

    fn serve(&self, action: Action, body: &serde_json::Value) -> Result<Reply> {
        let mut state = self.lock();
        state.calls.push(action);

        let fault = state
            .faults
            .get_mut(&action)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Fault::Pass);
        match fault {
            Fault::Pass => {}
            Fault::Status(status) => {
                return Ok(error_reply(status, "TEMPORARILY_UNAVAILABLE", "injected fault"));
            }
            Fault::Disconnect => {
                return Err(FilestoreError::undelivered(
                    action.as_str(),
                    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "injected disconnect"),
                ));
            }
            Fault::OutOfRange => {
                return Ok(error_reply(400, OUT_OF_RANGE, "offset beyond end of file"));
            }
            Fault::LostReply => {
                apply(&mut state, action, body)?;
                return Err(FilestoreError::transport(
                    action.as_str(),
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "injected lost reply"),
                ));
            }
        }
        apply(&mut state, action, body)
    }
}

fn apply(state: &mut State, action: Action, body: &serde_json::Value) -> Result<Reply> {
    match action {
        Action::Read => {
            let request: ReadRequest = parse(body)?;
            serve_read(state, &request)
        }
        Action::List => {
            let request: PathRequest = parse(body)?;
            serve_list(state, &request.path)
        }
        Action::Create => {
            let request: CreateRequest = parse(body)?;
            if !request.overwrite && state.file(&request.path).is_some() {
                return Ok(error_reply(400, "RESOURCE_ALREADY_EXISTS", &request.path));
            }
            state.next_handle += 1;
            let id = state.next_handle;
            state.handles.insert(
                id,
                OpenHandle {
                    path: request.path,
                    data: Vec::new(),
                },
            );
            Ok(Reply::json(200, &json!({ "handle": id })))
        }
        Action::AddBlock => {
            let request: AddBlockRequest = parse(body)?;
            if request.data.len() > API_PAYLOAD_LIMIT {
                return Ok(error_reply(400, "MAX_BLOCK_SIZE_EXCEEDED", "block too large"));
            }
            let Ok(bytes) = STANDARD.decode(request.data.as_bytes()) else {
                return Ok(error_reply(400, INVALID_PARAMETER_VALUE, "invalid base64"));
            };
            let Some(open) = handle_id(&request.handle).and_then(|id| state.handles.get_mut(&id))
            else {
                return Ok(error_reply(400, INVALID_PARAMETER_VALUE, "unknown handle"));
            };
            open.data.extend_from_slice(&bytes);
            state.block_sizes.push(request.data.len());
            Ok(Reply::json(200, &json!({})))
        }
        Action::Close => {
            let request: CloseRequest = parse(body)?;
            let Some(open) = handle_id(&request.handle).and_then(|id| state.handles.remove(&id))
            else {
                return Ok(error_reply(400, INVALID_PARAMETER_VALUE, "unknown handle"));
            };
            state.commit(open.path, open.data);
            Ok(Reply::json(200, &json!({})))
        }
        Action::Delete => {
            let request: DeleteRequest = parse(body)?;
            let path = request.path.trim_end_matches('/').to_string();
            let prefix = format!("{path}/");
            let exact = state.file(&path).is_some();
            let children = state.files.iter().any(|(p, _)| p.starts_with(&prefix));
            if !exact && !children {
                return Ok(error_reply(404, RESOURCE_DOES_NOT_EXIST, &path));
            }
            if children && !request.recursive {
                return Ok(error_reply(400, "IO_ERROR", "directory is not empty"));
            }
            state
                .files
                .retain(|(p, _)| *p != path && !p.starts_with(&prefix));
            Ok(Reply::json(200, &json!({})))
        }
    }
}

impl Transport for MemoryDbfs {
    fn call(&self, action: Action, body: &serde_json::Value) -> Result<Reply> {
        self.serve(action, body)
    }
}

fn serve_read(state: &State, request: &ReadRequest) -> Result<Reply> {
    let Some(data) = state.file(&request.path) else {
        return Ok(error_reply(404, RESOURCE_DOES_NOT_EXIST, &request.path));
    };
    if request.length as usize > MAX_READ_LENGTH {
        return Ok(error_reply(400, "MAX_READ_SIZE_EXCEEDED", "length too large"));
    }
    let start = (request.offset as usize).min(data.len());
    let end = start.saturating_add(request.length as usize).min(data.len());
    let slice = &data[start..end];
    Ok(Reply::json(
        200,
        &json!({ "bytes_read": slice.len(), "data": STANDARD.encode(slice) }),
    ))
}

fn serve_list(state: &State, path: &str) -> Result<Reply> {
    let folder = path.trim_end_matches('/');
    if let Some(data) = state.file(folder) {
        let entry = FileInfo::file(folder, data.len() as u64);
        return Ok(Reply::json(200, &json!({ "files": [entry] })));
    }

    let prefix = format!("{folder}/");
    let mut seen_dirs = BTreeSet::new();
    let mut entries = Vec::new();
    for (p, data) in &state.files {
        let Some(rest) = p.strip_prefix(&prefix) else {
            continue;
        };
        match rest.split_once('/') {
            None => entries.push(FileInfo::file(p.clone(), data.len() as u64)),
            Some((dir, _)) => {
                if seen_dirs.insert(dir.to_string()) {
                    entries.push(FileInfo {
                        path: format!("{prefix}{dir}"),
                        is_dir: true,
                        file_size: 0,
                    });
                }
            }
        }
    }
    if entries.is_empty() {
        return Ok(error_reply(404, RESOURCE_DOES_NOT_EXIST, folder));
    }
    Ok(Reply::json(200, &json!({ "files": entries })))
}

fn parse<T: DeserializeOwned>(body: &serde_json::Value) -> Result<T> {
    Ok(serde_json::from_value(body.clone())?)
}

fn handle_id(handle: &Handle) -> Option<i64> {
    match handle {
        Handle::Number(n) => Some(*n),
        Handle::Text(s) => s.parse().ok(),
    }
}

fn error_reply(status: u16, code: &str, message: &str) -> Reply {
    Reply::json(status, &json!({ "error_code": code, "message": message }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_shows_direct_children() {
        let dbfs = MemoryDbfs::new();
        dbfs.put_file("/out/part-0002.csv", b"b");
        dbfs.put_file("/out/part-0001.csv", b"a");
        dbfs.put_file("/out/nested/x.csv", b"x");

        let reply = dbfs.call(Action::List, &json!({"path": "/out/"})).unwrap();
        let listing: crate::wire::ListResponse = serde_json::from_slice(&reply.body).unwrap();
        let paths: Vec<_> = listing.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/out/part-0002.csv", "/out/part-0001.csv", "/out/nested"]
        );
        assert!(listing.files[2].is_dir);
    }

    #[test]
    fn test_inject_after_counts_passes() {
        let dbfs = MemoryDbfs::new();
        dbfs.put_file("/f", b"x");
        dbfs.inject_after(Action::Read, 1, Fault::Status(500));
        let body = json!({"path": "/f", "offset": 0, "length": 1});
        assert_eq!(dbfs.call(Action::Read, &body).unwrap().status, 200);
        assert_eq!(dbfs.call(Action::Read, &body).unwrap().status, 500);
        assert_eq!(dbfs.call(Action::Read, &body).unwrap().status, 200);
    }
}
