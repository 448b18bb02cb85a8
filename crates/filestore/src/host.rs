//! Workspace host normalization
//!
//! Users pass instance names in several shapes (`adb-1234.azuredatabricks.net`,
//! `https://adb-1234.azuredatabricks.net/`, `adb-1234.azuredatabricks`). All of
//! them normalize to the DBFS API root `https://<instance>.net/api/2.0/dbfs/`.

use crate::{FilestoreError, Result};
use url::Url;

const SCHEME_PREFIX: &str = "https://";
const DOMAIN_SUFFIX: &str = ".net";
const PLATFORM_DOMAIN: &str = "azuredatabricks";
const INSTANCE_PREFIX: &str = "adb";
const DBFS_API_PATH: &str = "api/2.0/dbfs/";

/// Canonical DBFS API root for one workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbfsHost {
    base: Url,
}

impl DbfsHost {
    /// Normalize a raw host string.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || FilestoreError::InvalidHost(raw.to_string());

        let mut host = raw.trim().trim_end_matches('/').to_string();
        if !host.contains(PLATFORM_DOMAIN) {
            return Err(invalid());
        }

        if !host.starts_with(SCHEME_PREFIX) && host.starts_with(INSTANCE_PREFIX) {
            host = format!("{SCHEME_PREFIX}{host}");
        }
        if !host.ends_with(DOMAIN_SUFFIX) && host.ends_with(PLATFORM_DOMAIN) {
            host.push_str(DOMAIN_SUFFIX);
        }
        if !(host.starts_with(SCHEME_PREFIX) && host.ends_with(DOMAIN_SUFFIX)) {
            return Err(invalid());
        }

        let base = Url::parse(&format!("{host}/{DBFS_API_PATH}")).map_err(|_| invalid())?;
        if base.host_str().is_none() || base.path() != format!("/{DBFS_API_PATH}") {
            return Err(invalid());
        }
        Ok(Self { base })
    }

    /// Use an arbitrary API root, e.g. a local mock server.
    ///
    /// The root must end with `/` so actions join beneath it.
    pub fn from_base_url(base: Url) -> Result<Self> {
        if !base.path().ends_with('/') {
            return Err(FilestoreError::InvalidHost(base.to_string()));
        }
        Ok(Self { base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// URL of one API action (`read`, `add-block`, ...).
    pub fn action_url(&self, action: &str) -> Result<Url> {
        self.base
            .join(action)
            .map_err(|_| FilestoreError::InvalidHost(self.base.to_string()))
    }
}

impl std::fmt::Display for DbfsHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base)
    }
}
