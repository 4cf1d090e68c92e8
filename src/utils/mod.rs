use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use md5::Md5;
use reqwest::header::{self, HeaderMap};
use reqwest::Client;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::metadata::FALLBACK_FILENAME;

const NAME_MAX: usize = 255;
const PART_SUFFIX: &str = ".part";

/// One client per invocation. Connect and read timeouts are bounded; there is
/// no total timeout so large transfers are not cut off mid-stream.
pub fn build_http_client(config: &Config) -> Result<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .build()
        .context("Failed to build HTTP client")
}

pub fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start().to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false)
}

/// True when the headers mark the body as file content rather than a page:
/// an attachment disposition, or a content type that is not text or markup.
/// A missing content type is not taken as file content.
pub fn serves_file(headers: &HeaderMap) -> bool {
    let attachment = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().contains("attachment"))
        .unwrap_or(false);
    if attachment {
        return true;
    }

    match headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    {
        Some(value) => {
            let media_type = value.trim_start().to_ascii_lowercase();
            !(media_type.is_empty()
                || media_type.starts_with("text/")
                || media_type.contains("html")
                || media_type.contains("xml"))
        }
        None => false,
    }
}

/// `file.iso` -> `file.iso.part`
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name: OsString = destination.as_os_str().to_owned();
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Turns a remote title into a single path component. Separators and control
/// characters become `_`; a result that names no file falls back to
/// `downloaded_file`.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c == '\0' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return FALLBACK_FILENAME.to_string();
    }

    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Expected digest of a download. The algorithm follows from the digest length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    Md5(String),
    Sha1(String),
    Sha256(String),
}

impl Checksum {
    pub fn parse(digest: &str) -> Result<Self> {
        let digest = digest.trim().to_ascii_lowercase();
        if hex::decode(&digest).is_err() {
            bail!("Checksum is not a hex string: {}", digest);
        }

        match digest.len() {
            32 => Ok(Self::Md5(digest)),
            40 => Ok(Self::Sha1(digest)),
            64 => Ok(Self::Sha256(digest)),
            len => bail!("Unknown hash length {} (expected 32, 40 or 64)", len),
        }
    }

    pub fn expected(&self) -> &str {
        match self {
            Self::Md5(digest) | Self::Sha1(digest) | Self::Sha256(digest) => digest,
        }
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Md5(_) => "md5",
            Self::Sha1(_) => "sha1",
            Self::Sha256(_) => "sha256",
        }
    }

    pub fn hasher(&self) -> FileHasher {
        match self {
            Self::Md5(_) => FileHasher::Md5(Md5::new()),
            Self::Sha1(_) => FileHasher::Sha1(Sha1::new()),
            Self::Sha256(_) => FileHasher::Sha256(Sha256::new()),
        }
    }
}

/// Incremental digest fed chunk by chunk while the body streams to disk.
pub enum FileHasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl FileHasher {
    pub fn sha256() -> Self {
        Self::Sha256(Sha256::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(hasher) => hasher.update(data),
            Self::Sha1(hasher) => hasher.update(data),
            Self::Sha256(hasher) => hasher.update(data),
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            Self::Md5(hasher) => hex::encode(hasher.finalize()),
            Self::Sha1(hasher) => hex::encode(hasher.finalize()),
            Self::Sha256(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_filename("a/b\\c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_filename("file\x00name.txt"), "file_name.txt");
    }

    #[test]
    fn sanitize_keeps_spaces_and_dotfiles() {
        assert_eq!(sanitize_filename("My Report (final).pdf"), "My Report (final).pdf");
        assert_eq!(sanitize_filename(".bashrc"), ".bashrc");
    }

    #[test]
    fn sanitize_falls_back_when_nothing_is_left() {
        assert_eq!(sanitize_filename("   "), "downloaded_file");
        assert_eq!(sanitize_filename(".."), "downloaded_file");
    }

    #[test]
    fn sanitize_truncates_on_char_boundary() {
        let name = "é".repeat(200);
        let out = sanitize_filename(&name);
        assert!(out.len() <= NAME_MAX);
        assert_eq!(out.chars().count(), 127);
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(part_path(Path::new("file.iso")), PathBuf::from("file.iso.part"));
        assert_eq!(
            part_path(Path::new("/tmp/archive.zip")),
            PathBuf::from("/tmp/archive.zip.part")
        );
    }

    #[test]
    fn html_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_html(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        assert!(is_html(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        assert!(!is_html(&headers));
    }

    #[test]
    fn file_content_detection() {
        let mut headers = HeaderMap::new();
        assert!(!serves_file(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!serves_file(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/xhtml+xml"),
        );
        assert!(!serves_file(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        assert!(serves_file(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"page.html\""),
        );
        assert!(serves_file(&headers));
    }

    #[test]
    fn checksum_algorithm_by_length() {
        let md5 = Checksum::parse(&"a".repeat(32)).unwrap();
        assert_eq!(md5.algorithm(), "md5");
        let sha1 = Checksum::parse(&"B".repeat(40)).unwrap();
        assert_eq!(sha1.algorithm(), "sha1");
        assert_eq!(sha1.expected(), "b".repeat(40));
        let sha256 = Checksum::parse(&"0".repeat(64)).unwrap();
        assert_eq!(sha256.algorithm(), "sha256");
    }

    #[test]
    fn checksum_rejects_bad_input() {
        assert!(Checksum::parse("abcd").is_err());
        assert!(Checksum::parse(&"z".repeat(32)).is_err());
    }

    #[test]
    fn hasher_matches_known_digests() {
        let mut hasher = Checksum::parse(&"0".repeat(32)).unwrap().hasher();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");

        let mut hasher = FileHasher::sha256();
        hasher.update(b"hello world");
        assert_eq!(
            hasher.finalize_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
