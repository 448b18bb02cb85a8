//! Request and response bodies of the DBFS API
//!
//! Field names follow the API's JSON. Optional response fields default so that
//! sparse replies (e.g. `{}` for an empty folder) still decode.

use serde::{Deserialize, Serialize};

/// One endpoint of the API, appended to the base URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    List,
    Create,
    AddBlock,
    Close,
    Delete,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Read,
        Action::List,
        Action::Create,
        Action::AddBlock,
        Action::Close,
        Action::Delete,
    ];

    /// Action for an endpoint name such as `add-block`
    pub fn from_name(name: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| a.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::List => "list",
            Action::Create => "create",
            Action::AddBlock => "add-block",
            Action::Close => "close",
            Action::Delete => "delete",
        }
    }

    /// Whether repeating a processed call leaves the same remote state.
    ///
    /// `add-block` appends again and `close` fails on a released handle.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Action::AddBlock | Action::Close)
    }

    /// Reads go out as GET, everything that mutates as POST.
    pub fn is_get(&self) -> bool {
        matches!(self, Action::Read | Action::List)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque write-handle identifier returned by `create`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Handle {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handle::Number(n) => write!(f, "{n}"),
            Handle::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRequest {
    pub path: String,
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadResponse {
    #[serde(default)]
    pub bytes_read: u64,
    /// Base64 of the bytes read
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRequest {
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub files: Vec<FileInfo>,
}

/// One entry of a folder listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub file_size: u64,
}

impl FileInfo {
    pub fn file(path: impl Into<String>, file_size: u64) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            file_size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub path: String,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    pub handle: Handle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddBlockRequest {
    pub handle: Handle,
    /// Base64 of the block contents
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRequest {
    pub handle: Handle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

/// Body of a non-2xx reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub message: String,
}

pub const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";
pub const OUT_OF_RANGE: &str = "OUT_OF_RANGE";
pub const INVALID_PARAMETER_VALUE: &str = "INVALID_PARAMETER_VALUE";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_accepts_numbers_and_strings() {
        let numeric: CreateResponse = serde_json::from_str(r#"{"handle": 7}"#).unwrap();
        assert_eq!(numeric.handle, Handle::Number(7));

        let text: CreateResponse = serde_json::from_str(r#"{"handle": "h-7"}"#).unwrap();
        assert_eq!(text.handle, Handle::Text("h-7".to_string()));

        let body = serde_json::to_value(AddBlockRequest {
            handle: Handle::Number(7),
            data: "QQ==".to_string(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"handle": 7, "data": "QQ=="}));
    }

    #[test]
    fn test_sparse_responses() {
        let listing: ListResponse = serde_json::from_str("{}").unwrap();
        assert!(listing.files.is_empty());

        let read: ReadResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(read.bytes_read, 0);

        let entry: FileInfo = serde_json::from_str(r#"{"path": "/a/_SUCCESS"}"#).unwrap();
        assert!(!entry.is_dir);
    }

    #[test]
    fn test_action_methods() {
        assert!(Action::Read.is_get());
        assert!(Action::List.is_get());
        assert!(!Action::AddBlock.is_get());
        assert_eq!(Action::AddBlock.to_string(), "add-block");
        assert_eq!(Action::from_name("add-block"), Some(Action::AddBlock));
        assert_eq!(Action::from_name("mkdirs"), None);
        assert!(Action::Delete.is_idempotent());
        assert!(!Action::AddBlock.is_idempotent());
    }
}
