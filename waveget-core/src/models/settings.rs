use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::media::OutputKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSettings {
    pub schema_version: u32,
    pub download: DownloadSettings,
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub advanced: AdvancedSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadSettings {
    pub default_output_dir: PathBuf,
    pub output_kind: OutputKind,
    pub audio_quality: String,
    pub video_quality: String,
    #[serde(default)]
    pub open_folder_after_download: bool,
}

/// Locations of the external tools. Passed into every request; the workers
/// never look settings up on their own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSettings {
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,
    /// Directory holding the ffmpeg binary, or the binary itself.
    #[serde(default)]
    pub ffmpeg_location: Option<PathBuf>,
    #[serde(default = "default_filename_template")]
    pub filename_template: String,
    /// Managed tool directory, filled in by the caller from its `AppPaths`.
    #[serde(skip)]
    pub managed_bin_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisSettings {
    #[serde(default = "default_true")]
    pub auto_analyze: bool,
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: f64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_key_confidence_threshold")]
    pub key_confidence_threshold: f64,
    #[serde(default = "default_tempo_agreement_bpm")]
    pub tempo_agreement_bpm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvancedSettings {
    /// 0 disables the timeout.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

pub fn default_filename_template() -> String {
    "%(title)s.%(ext)s".into()
}

fn default_max_duration_secs() -> f64 {
    60.0
}

fn default_sample_rate() -> u32 {
    22_050
}

fn default_key_confidence_threshold() -> f64 {
    0.6
}

fn default_tempo_agreement_bpm() -> f64 {
    10.0
}

fn default_probe_timeout_secs() -> u64 {
    30
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffmpeg_location: None,
            filename_template: default_filename_template(),
            managed_bin_dir: None,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            auto_analyze: true,
            max_duration_secs: default_max_duration_secs(),
            sample_rate: default_sample_rate(),
            key_confidence_threshold: default_key_confidence_threshold(),
            tempo_agreement_bpm: default_tempo_agreement_bpm(),
        }
    }
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: 1,
            download: DownloadSettings {
                default_output_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
                output_kind: OutputKind::AudioLossless,
                audio_quality: "320k".into(),
                video_quality: "1080p".into(),
                open_folder_after_download: false,
            },
            tools: ToolSettings::default(),
            analysis: AnalysisSettings::default(),
            advanced: AdvancedSettings::default(),
        }
    }
}

impl AppSettings {
    /// Quality selector matching the configured output kind.
    pub fn quality_for(&self, kind: OutputKind) -> &str {
        if kind.is_audio() {
            &self.download.audio_quality
        } else {
            &self.download.video_quality
        }
    }
}
