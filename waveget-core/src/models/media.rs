use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::settings::ToolSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    AudioLossless,
    AudioLossy,
    Video,
}

impl OutputKind {
    pub fn is_audio(&self) -> bool {
        !matches!(self, OutputKind::Video)
    }

    /// Codec handed to `--audio-format` for audio kinds.
    pub fn audio_codec(&self) -> Option<&'static str> {
        match self {
            OutputKind::AudioLossless => Some("wav"),
            OutputKind::AudioLossy => Some("mp3"),
            OutputKind::Video => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputKind::AudioLossless => "wav",
            OutputKind::AudioLossy => "mp3",
            OutputKind::Video => "mp4",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputKind::AudioLossless => "audio-lossless",
            OutputKind::AudioLossy => "audio-lossy",
            OutputKind::Video => "video",
        };
        f.write_str(s)
    }
}

impl FromStr for OutputKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "audio-lossless" | "lossless" | "wav" => Ok(OutputKind::AudioLossless),
            "audio-lossy" | "lossy" | "mp3" => Ok(OutputKind::AudioLossy),
            "video" | "mp4" => Ok(OutputKind::Video),
            other => Err(anyhow::anyhow!("Unknown output kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    pub kind: OutputKind,
    pub quality: String,
    #[serde(default)]
    pub tools: ToolSettings,
}

impl DownloadRequest {
    pub fn new(
        url: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        kind: OutputKind,
        quality: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let url = url.into().trim().to_string();
        if url.is_empty() {
            anyhow::bail!("Please enter a URL");
        }
        Ok(Self {
            url,
            output_dir: output_dir.into(),
            kind,
            quality: quality.into(),
            tools: ToolSettings::default(),
        })
    }

    pub fn with_tools(mut self, tools: ToolSettings) -> Self {
        self.tools = tools;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedDownload {
    pub file_path: PathBuf,
    pub kind: OutputKind,
    pub file_size_bytes: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum DownloadOutcome {
    Success(CompletedDownload),
    Failure { message: String },
}

impl DownloadOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        DownloadOutcome::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Success(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    /// Zero when the source does not report a duration.
    pub duration_seconds: u64,
    pub uploader: String,
    pub view_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_kind_parses_names_and_aliases() {
        assert_eq!("audio-lossy".parse::<OutputKind>().unwrap(), OutputKind::AudioLossy);
        assert_eq!("WAV".parse::<OutputKind>().unwrap(), OutputKind::AudioLossless);
        assert_eq!("mp4".parse::<OutputKind>().unwrap(), OutputKind::Video);
        assert!("flac".parse::<OutputKind>().is_err());
    }

    #[test]
    fn output_kind_extensions() {
        assert_eq!(OutputKind::AudioLossless.extension(), "wav");
        assert_eq!(OutputKind::AudioLossy.extension(), "mp3");
        assert_eq!(OutputKind::Video.extension(), "mp4");
        assert_eq!(OutputKind::Video.audio_codec(), None);
    }

    #[test]
    fn request_rejects_blank_url() {
        assert!(DownloadRequest::new("   ", "/tmp", OutputKind::Video, "best").is_err());
    }

    #[test]
    fn request_trims_url() {
        let req = DownloadRequest::new(" https://example.com/v ", "/tmp", OutputKind::Video, "720p")
            .unwrap();
        assert_eq!(req.url, "https://example.com/v");
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_value(DownloadOutcome::failure("boom")).unwrap();
        assert_eq!(json["type"], "Failure");
        assert_eq!(json["data"]["message"], "boom");
    }
}
