use std::sync::LazyLock;

use anyhow::{Context, Result};
use reqwest::{Client, Url};
use scraper::{Html, Selector};

use crate::config::{Config, Endpoints, FileId};
use crate::downloader::build_link;
use crate::utils::serves_file;

const WARNING_PHRASE: &str = "Google Drive has detected issues with your download";

static WARNING_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p.uc-warning-caption").expect("valid warning selector"));
static UUID_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[name="uuid"]"#).expect("valid uuid selector"));

/// Fetches the preview page and pulls the confirmation token out of the
/// virus-scan warning form, if Drive shows one.
pub struct WarningPageProber {
    client: Client,
    endpoints: Endpoints,
}

impl WarningPageProber {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            endpoints: config.endpoints.clone(),
        }
    }

    /// The preview page lives at the same address as the plain download link.
    pub fn preview_url(&self, id: &FileId) -> Url {
        build_link(&self.endpoints, id, None)
    }

    pub async fn probe(&self, id: &FileId) -> Result<Option<String>> {
        let url = self.preview_url(id);
        log::debug!("Fetching preview page {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch preview page")?;

        log::debug!("Preview page status: {}", response.status());

        // Small files are served straight away instead of a page.
        if serves_file(response.headers()) {
            log::debug!("Preview returned file content, proceeding without UUID.");
            return Ok(None);
        }

        let html = response
            .text()
            .await
            .context("Failed to read preview page")?;

        Ok(extract_token(&html))
    }
}

/// Returns the `uuid` form value when the page carries the download warning.
pub fn extract_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let has_warning = document
        .select(&WARNING_SELECTOR)
        .next()
        .map(|caption| caption.text().collect::<String>().contains(WARNING_PHRASE))
        .unwrap_or(false);

    if !has_warning {
        log::debug!("No download warning found, proceeding without UUID.");
        return None;
    }

    let token = document
        .select(&UUID_SELECTOR)
        .next()
        .and_then(|input| input.value().attr("value"))
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    match &token {
        Some(uuid) => log::debug!("UUID found: {}", uuid),
        None => log::debug!("UUID not found."),
    }

    token
}
