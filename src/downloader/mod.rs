use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use futures::StreamExt;
use reqwest::header;
use reqwest::{Client, Response, Url};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::{Config, Endpoints, FileId};
use crate::metadata::MetadataResolver;
use crate::prober::WarningPageProber;
use crate::utils::*;

/// What one invocation produced.
#[allow(dead_code)]
#[derive(Debug)]
pub struct Outcome {
    pub link: Url,
    pub token: Option<String>,
    pub saved: Option<SavedFile>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct SavedFile {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Probe, print the link, and download it when `auto` is set.
pub async fn run(config: &Config) -> Result<Outcome> {
    let client = build_http_client(config)?;

    let token = WarningPageProber::new(client.clone(), config)
        .probe(&config.id)
        .await?;

    let link = build_link(&config.endpoints, &config.id, token.as_deref());
    log::debug!("Download link: {}", link);
    println!("{}", link);

    if !config.auto {
        return Ok(Outcome {
            link,
            token,
            saved: None,
        });
    }

    let destination = match &config.output {
        Some(path) => path.clone(),
        None => {
            let title = MetadataResolver::new(client.clone(), config)
                .resolve_filename(&config.id)
                .await?;
            config.output_dir.join(sanitize_filename(&title))
        }
    };

    let bytes = Downloader::new(client, config)
        .download(&link, &destination)
        .await?;

    Ok(Outcome {
        link,
        token,
        saved: Some(SavedFile {
            path: destination,
            bytes,
        }),
    })
}

/// Token-qualified link on the usercontent host, plain `uc` link otherwise.
/// The plain form only re-surfaces the warning page for large files.
pub fn build_link(endpoints: &Endpoints, id: &FileId, token: Option<&str>) -> Url {
    match token {
        Some(uuid) => {
            let mut url = endpoints.usercontent.clone();
            url.set_path("/download");
            url.query_pairs_mut()
                .append_pair("id", id.as_str())
                .append_pair("export", "download")
                .append_pair("authuser", "0")
                .append_pair("confirm", "t")
                .append_pair("uuid", uuid);
            url
        }
        None => {
            let mut url = endpoints.drive.clone();
            url.set_path("/uc");
            url.query_pairs_mut()
                .append_pair("export", "download")
                .append_pair("id", id.as_str());
            url
        }
    }
}

pub struct Downloader {
    client: Client,
    referer: String,
    checksum: Option<Checksum>,
}

impl Downloader {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            referer: config.referer.clone(),
            checksum: config.checksum.clone(),
        }
    }

    /// Streams the body into `<destination>.part` and renames it into place.
    /// On any failure the `.part` file is removed and `destination` is untouched.
    pub async fn download(&self, link: &Url, destination: &Path) -> Result<u64> {
        log::debug!("Downloading {} to {}", link, destination.display());

        let response = self
            .client
            .get(link.clone())
            .header(header::REFERER, &self.referer)
            .send()
            .await
            .context("Failed to send download request")?;

        if !response.status().is_success() {
            return Err(anyhow!("Invalid status code: {}", response.status()));
        }

        if is_html(response.headers()) {
            log::warn!(
                "{} returned an HTML page; Drive may have served its warning page \
                 instead of the file",
                response.url()
            );
        }

        let part = part_path(destination);
        let result = async {
            let written = self.write_body(response, &part).await?;
            fs::rename(&part, destination).await.with_context(|| {
                format!("Failed to move download to {}", destination.display())
            })?;
            Ok::<u64, anyhow::Error>(written)
        }
        .await;

        if result.is_err() {
            if let Err(cleanup) = fs::remove_file(&part).await {
                log::debug!("Could not remove {}: {}", part.display(), cleanup);
            }
        }
        result
    }

    async fn write_body(&self, response: Response, part: &Path) -> Result<u64> {
        if let Some(parent) = part.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create parent directory")?;
        }

        let mut file = fs::File::create(part)
            .await
            .with_context(|| format!("Failed to create {}", part.display()))?;

        let mut hasher = match &self.checksum {
            Some(checksum) => checksum.hasher(),
            None => FileHasher::sha256(),
        };
        let mut written: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read response body")?;
            file.write_all(&chunk)
                .await
                .context("Failed to write data to output file")?;
            hasher.update(&chunk);
            written += chunk.len() as u64;
        }

        file.flush().await.context("Failed to flush output file")?;
        drop(file);

        let digest = hasher.finalize_hex();
        match &self.checksum {
            Some(checksum) if checksum.expected() != digest => {
                bail!(
                    "Checksum mismatch: expected {} {}, actual {}",
                    checksum.algorithm(),
                    checksum.expected(),
                    digest
                );
            }
            Some(checksum) => log::info!("{} checksum matched", checksum.algorithm()),
            None => log::debug!("sha256: {}", digest),
        }

        Ok(written)
    }
}
