use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::anyhow;
use serde::Serialize;

use crate::core::ytdlp;
use crate::models::media::VideoMetadata;

/// Asks yt-dlp for metadata only. Nothing is downloaded.
pub async fn fetch_metadata(
    ytdlp_path: &Path,
    url: &str,
    timeout: Option<Duration>,
) -> anyhow::Result<VideoMetadata> {
    let url = url.trim();
    if url.is_empty() {
        return Err(anyhow!("Please enter a URL"));
    }

    let json = match timeout {
        Some(limit) => tokio::time::timeout(limit, ytdlp::get_video_info(ytdlp_path, url))
            .await
            .map_err(|_| anyhow!("Timed out after {}s fetching info", limit.as_secs()))??,
        None => ytdlp::get_video_info(ytdlp_path, url).await?,
    };

    let meta = parse_metadata(&json);
    tracing::debug!("probe {}: {:?}", url, meta);
    Ok(meta)
}

pub fn parse_metadata(json: &serde_json::Value) -> VideoMetadata {
    let text = |key: &str| {
        json.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let duration_seconds = json
        .get("duration")
        .and_then(|v| v.as_f64())
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| d as u64)
        .unwrap_or(0);

    let view_count = json
        .get("view_count")
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0);

    VideoMetadata {
        title: text("title").unwrap_or_else(|| "Unknown Title".to_string()),
        duration_seconds,
        uploader: text("uploader")
            .or_else(|| text("channel"))
            .unwrap_or_else(|| "Unknown".to_string()),
        view_count,
    }
}

pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else {
        format!("{}m {}s", minutes, seconds)
    }
}

pub fn format_views(views: u64) -> String {
    if views >= 1_000_000 {
        format!("{:.1}M", views as f64 / 1_000_000.0)
    } else if views >= 1_000 {
        format!("{:.1}K", views as f64 / 1_000.0)
    } else {
        views.to_string()
    }
}

/// Display-ready view of [`VideoMetadata`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetadataSummary {
    pub title: String,
    pub duration: String,
    pub uploader: String,
    pub views: String,
}

impl From<&VideoMetadata> for MetadataSummary {
    fn from(meta: &VideoMetadata) -> Self {
        Self {
            title: meta.title.clone(),
            duration: format_duration(meta.duration_seconds),
            uploader: meta.uploader.clone(),
            views: format_views(meta.view_count),
        }
    }
}

impl fmt::Display for MetadataSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Title: {}", self.title)?;
        writeln!(f, "Duration: {}", self.duration)?;
        writeln!(f, "Uploader: {}", self.uploader)?;
        write!(f, "Views: {}", self.views)
    }
}
