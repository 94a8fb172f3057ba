use serde::Serialize;
use uuid::Uuid;

use crate::analysis::AnalysisReport;
use crate::models::media::{DownloadOutcome, VideoMetadata};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadPhase {
    Downloading,
    Converting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DownloadProgress {
    pub phase: DownloadPhase,
    /// Only present while the total size is known.
    pub percent: Option<f64>,
    pub speed_bytes_per_sec: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub status: String,
}

impl DownloadProgress {
    pub fn status(phase: DownloadPhase, status: impl Into<String>) -> Self {
        Self {
            phase,
            percent: None,
            speed_bytes_per_sec: None,
            eta_seconds: None,
            status: status.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum DownloadEvent {
    Progress(DownloadProgress),
    Finished(DownloadOutcome),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum AnalysisEvent {
    Status(String),
    Finished(Result<AnalysisReport, String>),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ProbeEvent {
    Finished(Result<VideoMetadata, String>),
}

/// Sink for everything the workers report. Implementations must not block;
/// they run on the worker's task.
pub trait EventEmitter: Send + Sync + Clone + 'static {
    fn emit_download(&self, id: Uuid, event: &DownloadEvent);
    fn emit_analysis(&self, event: &AnalysisEvent);
    fn emit_probe(&self, url: &str, event: &ProbeEvent);
}
