//! Media downloader for collected ads.
//!
//! Consumes image, video, and thumbnail URLs from yielded ad records and
//! writes the files under an output directory. Download failures are
//! reported per file and never lose ad data.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::Ad;

/// What kind of creative asset a download is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Thumbnail,
}

impl MediaKind {
    fn default_extension(&self) -> &'static str {
        match self {
            Self::Image | Self::Thumbnail => "jpg",
            Self::Video => "mp4",
        }
    }
}

/// Outcome of one media download attempt.
#[derive(Debug, Clone, Serialize)]
pub struct MediaDownloadResult {
    pub ad_id: String,
    pub kind: MediaKind,
    pub url: String,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

impl MediaDownloadResult {
    pub fn succeeded(&self) -> bool {
        self.path.is_some()
    }
}

/// Downloads creative assets for collected ads.
pub struct MediaDownloader {
    client: reqwest::Client,
    output_dir: PathBuf,
}

impl MediaDownloader {
    /// Create a downloader writing into `output_dir` (created on demand).
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, output_dir })
    }

    /// Download every asset referenced by the ad's creatives. Never fails
    /// the ad: per-file failures are carried in the results.
    pub async fn download_ad_media(&self, ad: &Ad) -> Vec<MediaDownloadResult> {
        let mut results = Vec::new();
        for (index, creative) in ad.creatives.iter().enumerate() {
            if let Some(url) = &creative.image_url {
                results.push(self.fetch(ad, MediaKind::Image, index, url).await);
            }
            if let Some(url) = creative
                .video_hd_url
                .as_ref()
                .or(creative.video_sd_url.as_ref())
                .or(creative.video_url.as_ref())
            {
                results.push(self.fetch(ad, MediaKind::Video, index, url).await);
            }
            if let Some(url) = &creative.thumbnail_url {
                results.push(self.fetch(ad, MediaKind::Thumbnail, index, url).await);
            }
        }
        results
    }

    async fn fetch(
        &self,
        ad: &Ad,
        kind: MediaKind,
        index: usize,
        url: &str,
    ) -> MediaDownloadResult {
        let mut result = MediaDownloadResult {
            ad_id: ad.id.clone(),
            kind,
            url: url.to_string(),
            path: None,
            error: None,
        };

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(ad_id = ad.id, url, error = %e, "media download failed");
                result.error = Some(e.to_string());
                return result;
            }
        };
        if !response.status().is_success() {
            result.error = Some(format!("HTTP {}", response.status()));
            return result;
        }

        let extension = extension_for(&response, url).unwrap_or(kind.default_extension());
        let filename = format!(
            "{}_{}{}.{}",
            sanitize_component(&ad.id),
            kind_tag(kind),
            index,
            extension
        );
        let path = self.output_dir.join(filename);

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                result.error = Some(e.to_string());
                return result;
            }
        };
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            result.error = Some(e.to_string());
            return result;
        }

        debug!(ad_id = ad.id, path = %path.display(), bytes = bytes.len(), "media saved");
        result.path = Some(path);
        result
    }
}

fn kind_tag(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "img",
        MediaKind::Video => "vid",
        MediaKind::Thumbnail => "thumb",
    }
}

/// Extension from the Content-Type header, else from the URL path.
fn extension_for(response: &reqwest::Response, url: &str) -> Option<&'static str> {
    if let Some(content_type) = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
    {
        let ext = match content_type.split(';').next().unwrap_or_default() {
            "image/jpeg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/gif" => Some("gif"),
            "image/webp" => Some("webp"),
            "video/mp4" => Some("mp4"),
            "video/webm" => Some("webm"),
            _ => None,
        };
        if ext.is_some() {
            return ext;
        }
    }

    let path = url.split(['?', '#']).next().unwrap_or_default();
    match path.rsplit('.').next().unwrap_or_default() {
        "jpg" | "jpeg" => Some("jpg"),
        "png" => Some("png"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        "mp4" => Some("mp4"),
        "webm" => Some("webm"),
        _ => None,
    }
}

fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
