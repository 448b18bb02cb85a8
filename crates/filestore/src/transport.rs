//! The HTTP seam
//!
//! [`Transport`] performs one authenticated call and hands back the raw status
//! and body; interpreting them is the client's job. [`HttpTransport`] is the
//! real implementation over `reqwest::blocking`; tests substitute
//! [`crate::testing::MemoryDbfs`].

use crate::config::LinkConfig;
use crate::host::DbfsHost;
use crate::wire::Action;
use crate::{FilestoreError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Raw reply of one API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            body: value.to_string().into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one JSON-bodied request for `action`.
///
/// Returns `Err` only when no HTTP reply was obtained at all; error statuses
/// come back as a [`Reply`].
pub trait Transport {
    fn call(&self, action: Action, body: &serde_json::Value) -> Result<Reply>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn call(&self, action: Action, body: &serde_json::Value) -> Result<Reply> {
        (**self).call(action, body)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn call(&self, action: Action, body: &serde_json::Value) -> Result<Reply> {
        (**self).call(action, body)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn call(&self, action: Action, body: &serde_json::Value) -> Result<Reply> {
        (**self).call(action, body)
    }
}

/// Bearer-token authenticated blocking HTTP transport
pub struct HttpTransport {
    http_client: reqwest::blocking::Client,
    host: DbfsHost,
    token: String,
}

impl HttpTransport {
    pub fn new(host: DbfsHost, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FilestoreError::transport("client setup", e))?;

        Ok(Self {
            http_client,
            host,
            token: token.into(),
        })
    }

    pub fn from_config(config: &LinkConfig) -> Result<Self> {
        config.validate()?;
        let host = DbfsHost::parse(&config.host)?;
        Self::new(host, config.token.clone(), config.timeout())
    }

    pub fn host(&self) -> &DbfsHost {
        &self.host
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("host", &self.host.to_string())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Transport for HttpTransport {
    fn call(&self, action: Action, body: &serde_json::Value) -> Result<Reply> {
        let url = self.host.action_url(action.as_str())?;
        let request = if action.is_get() {
            self.http_client.get(url)
        } else {
            self.http_client.post(url)
        };

        let response = request
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    FilestoreError::undelivered(action.as_str(), e)
                } else {
                    FilestoreError::transport(action.as_str(), e)
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| FilestoreError::transport(action.as_str(), e))?;

        Ok(Reply {
            status,
            body: body.to_vec(),
        })
    }
}
