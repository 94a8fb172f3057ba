use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::events::DownloadEvent;
use crate::core::{acquisition, dependencies, probe};
use crate::models::media::{DownloadOutcome, DownloadRequest, VideoMetadata};
use crate::models::settings::ToolSettings;

#[async_trait]
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_metadata(&self, url: &str) -> anyhow::Result<VideoMetadata>;
    /// Sends progress and exactly one `Finished` event, then returns the same
    /// outcome.
    async fn download(
        &self,
        request: DownloadRequest,
        events: mpsc::Sender<DownloadEvent>,
        cancel: CancellationToken,
    ) -> DownloadOutcome;
}

pub struct YtDlpBackend {
    tools: ToolSettings,
    probe_timeout: Option<Duration>,
}

impl YtDlpBackend {
    pub fn new(tools: ToolSettings, probe_timeout: Option<Duration>) -> Self {
        Self {
            tools,
            probe_timeout,
        }
    }

    async fn ytdlp(&self) -> anyhow::Result<PathBuf> {
        dependencies::resolve_ytdlp(&self.tools).await
    }
}

#[async_trait]
impl MediaBackend for YtDlpBackend {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn fetch_metadata(&self, url: &str) -> anyhow::Result<VideoMetadata> {
        let ytdlp = self.ytdlp().await?;
        probe::fetch_metadata(&ytdlp, url, self.probe_timeout).await
    }

    async fn download(
        &self,
        request: DownloadRequest,
        events: mpsc::Sender<DownloadEvent>,
        cancel: CancellationToken,
    ) -> DownloadOutcome {
        acquisition::run(request, events, cancel).await
    }
}
