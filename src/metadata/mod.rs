use anyhow::{Context, Result};
use reqwest::header;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::config::{Config, FileId};

pub const FALLBACK_FILENAME: &str = "downloaded_file";

#[derive(Debug, Deserialize)]
struct FileMetadata {
    title: Option<String>,
}

/// Looks up the display title of a shared file through the public v2 files API.
pub struct MetadataResolver {
    client: Client,
    api: Url,
    api_key: Option<String>,
    referer: String,
}

impl MetadataResolver {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            api: config.endpoints.api.clone(),
            api_key: config.api_key.clone(),
            referer: config.referer.clone(),
        }
    }

    pub fn metadata_url(&self, id: &FileId) -> Url {
        let mut url = self.api.clone();
        url.set_path(&format!("/drive/v2/files/{}", id));
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("fields", "title");
            if let Some(key) = &self.api_key {
                query.append_pair("key", key);
            }
        }
        url
    }

    /// Never fails on a bad answer from the API, only on transport errors.
    pub async fn resolve_filename(&self, id: &FileId) -> Result<String> {
        let url = self.metadata_url(id);

        let response = self
            .client
            .get(url)
            .header(header::REFERER, &self.referer)
            .send()
            .await
            .context("Failed to send metadata request")?;

        let status = response.status();
        if !status.is_success() {
            log::debug!("Metadata request returned status {}", status);
        }

        let body = response
            .text()
            .await
            .context("Failed to read metadata response")?;

        let filename = parse_title(&body);
        log::debug!("Resolved filename: {}", filename);
        Ok(filename)
    }
}

/// Title from a metadata body, or [`FALLBACK_FILENAME`] when there is none.
pub fn parse_title(body: &str) -> String {
    match serde_json::from_str::<FileMetadata>(body) {
        Ok(FileMetadata {
            title: Some(title),
        }) if !title.is_empty() => title,
        Ok(_) => {
            log::debug!("Metadata has no title, using {}", FALLBACK_FILENAME);
            FALLBACK_FILENAME.to_string()
        }
        Err(err) => {
            log::debug!("Unparseable metadata ({}), using {}", err, FALLBACK_FILENAME);
            FALLBACK_FILENAME.to_string()
        }
    }
}
