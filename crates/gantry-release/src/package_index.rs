//! Package index lookups
//!
//! Used to skip publishing a package version that is already available.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

use gantry_core::{GantryError, Result, Version};

const DEFAULT_INDEX_URL: &str = "https://index.crates.io";

/// A registry that can say whether a version is published
pub trait PackageIndex: Send + Sync {
    fn is_published(&self, name: &str, version: &Version) -> Result<bool>;
}

/// crates.io sparse index client
pub struct CratesIoIndex {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct IndexLine {
    vers: String,
}

impl CratesIoIndex {
    /// Client for the public crates.io index
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_INDEX_URL)
    }

    /// Client for a sparse index at `base_url`
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gantry/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GantryError::other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

/// Path of a crate's file in a sparse index
pub fn index_path(name: &str) -> String {
    let name = name.to_ascii_lowercase();
    match name.len() {
        1 => format!("1/{}", name),
        2 => format!("2/{}", name),
        3 => format!("3/{}/{}", &name[..1], name),
        _ => format!("{}/{}/{}", &name[..2], &name[2..4], name),
    }
}

/// Whether any line of an index file lists `version`
fn lists_version(body: &str, version: &Version) -> bool {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<IndexLine>(line).ok())
        .any(|entry| Version::parse(&entry.vers).is_ok_and(|v| v == *version))
}

impl PackageIndex for CratesIoIndex {
    #[instrument(skip(self))]
    fn is_published(&self, name: &str, version: &Version) -> Result<bool> {
        let url = format!("{}/{}", self.base_url, index_path(name));
        debug!(url = %url, "querying package index");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| GantryError::other(format!("Package index request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(GantryError::other(format!(
                "Package index returned {} for {}",
                response.status(),
                name
            )));
        }

        let body = response
            .text()
            .map_err(|e| GantryError::other(format!("Package index read failed: {}", e)))?;
        Ok(lists_version(&body, version))
    }
}
