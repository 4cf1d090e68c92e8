use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Url;

use crate::utils::Checksum;

pub const DRIVE_BASE: &str = "https://drive.google.com";
pub const USERCONTENT_BASE: &str = "https://drive.usercontent.google.com";
pub const API_BASE: &str = "https://www.googleapis.com";

/// Origin sent as `Referer` on metadata and download requests. The metadata
/// API refuses anonymous reads without it.
pub const REFERER: &str = "https://drive.google.com";

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Opaque identifier of a shared Drive item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileId(String);

impl FileId {
    /// Blank input is rejected; anything else is kept exactly as given.
    pub fn new(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            bail!("File id must not be empty");
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base URLs of the three hosts the tool talks to.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Preview page and plain download links.
    pub drive: Url,
    /// Token-qualified download links.
    pub usercontent: Url,
    /// Metadata API.
    pub api: Url,
}

impl Endpoints {
    pub fn new(drive: &str, usercontent: &str, api: &str) -> Result<Self> {
        Ok(Self {
            drive: Url::parse(drive).with_context(|| format!("Invalid drive URL: {}", drive))?,
            usercontent: Url::parse(usercontent)
                .with_context(|| format!("Invalid usercontent URL: {}", usercontent))?,
            api: Url::parse(api).with_context(|| format!("Invalid API URL: {}", api))?,
        })
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DRIVE_BASE, USERCONTENT_BASE, API_BASE)
            .expect("built-in endpoints are valid URLs")
    }
}

/// Everything one invocation needs, built once from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub id: FileId,
    /// Download the file after printing the link.
    pub auto: bool,
    /// Explicit destination; skips the metadata lookup.
    pub output: Option<PathBuf>,
    /// Where a metadata-named download is saved.
    pub output_dir: PathBuf,
    pub api_key: Option<String>,
    pub checksum: Option<Checksum>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub endpoints: Endpoints,
    pub referer: String,
}

impl Config {
    pub fn new(id: &str) -> Result<Self> {
        Ok(Self {
            id: FileId::new(id)?,
            auto: false,
            output: None,
            output_dir: PathBuf::from("."),
            api_key: None,
            checksum: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            endpoints: Endpoints::default(),
            referer: REFERER.to_string(),
        })
    }
}

#[cfg(test)]
impl Config {
    /// Config whose endpoints all point at one local mock server.
    pub fn for_mock_server(id: &str, uri: &str) -> Self {
        let mut config = Self::new(id).unwrap();
        config.endpoints = Endpoints::new(uri, uri, uri).unwrap();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_id() {
        assert!(FileId::new("").is_err());
        assert!(FileId::new("   ").is_err());
    }

    #[test]
    fn keeps_id_verbatim() {
        assert_eq!(FileId::new("abc123").unwrap().as_str(), "abc123");
        assert_eq!(FileId::new(" abc123\n").unwrap().as_str(), " abc123\n");
    }

    #[test]
    fn defaults_point_at_drive() {
        let config = Config::new("abc123").unwrap();
        assert!(!config.auto);
        assert_eq!(config.endpoints.drive.host_str(), Some("drive.google.com"));
        assert_eq!(
            config.endpoints.usercontent.host_str(),
            Some("drive.usercontent.google.com")
        );
        assert_eq!(config.referer, "https://drive.google.com");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn bad_endpoint_is_an_error() {
        assert!(Endpoints::new("not a url", USERCONTENT_BASE, API_BASE).is_err());
    }
}
