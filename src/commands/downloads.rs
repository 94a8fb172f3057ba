use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;
use waveget_core::analysis::AnalysisConfig;
use waveget_core::core::events::{DownloadEvent, DownloadPhase, EventEmitter};
use waveget_core::models::media::{DownloadOutcome, DownloadRequest, OutputKind};

use crate::commands::analysis::start_analysis;
use crate::AppState;

/// Caller overrides; anything left `None` comes from settings.
#[derive(Debug, Clone, Default)]
pub struct DownloadArgs {
    pub url: String,
    pub output_dir: Option<PathBuf>,
    pub kind: Option<OutputKind>,
    pub quality: Option<String>,
    pub auto_analyze: Option<bool>,
    pub open_folder: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadStarted {
    pub id: Uuid,
    pub url: String,
    pub kind: OutputKind,
    pub quality: String,
    pub output_dir: PathBuf,
    pub open_folder: bool,
}

pub struct DownloadTask {
    pub started: DownloadStarted,
    pub handle: JoinHandle<DownloadOutcome>,
}

pub struct ProgressThrottle {
    last_emit: Instant,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub fn new(min_interval_ms: u64) -> Self {
        let min_interval = Duration::from_millis(min_interval_ms);
        Self {
            last_emit: Instant::now()
                .checked_sub(min_interval)
                .unwrap_or_else(Instant::now),
            min_interval,
        }
    }

    pub fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_emit) >= self.min_interval {
            self.last_emit = now;
            true
        } else {
            false
        }
    }

    /// Phase changes, 100% and the terminal event always pass.
    pub fn should_forward(&mut self, event: &DownloadEvent) -> bool {
        match event {
            DownloadEvent::Finished(_) => true,
            DownloadEvent::Progress(p) => {
                if p.phase != DownloadPhase::Downloading || p.percent == Some(100.0) {
                    self.last_emit = Instant::now();
                    true
                } else {
                    self.should_emit()
                }
            }
        }
    }
}

pub async fn download_from_url<E: EventEmitter>(
    state: &AppState,
    emitter: E,
    args: DownloadArgs,
) -> Result<DownloadTask, String> {
    let settings = state.load_settings();
    let kind = args.kind.unwrap_or(settings.download.output_kind);
    let quality = args
        .quality
        .unwrap_or_else(|| settings.quality_for(kind).to_string());
    let output_dir = args
        .output_dir
        .unwrap_or_else(|| settings.download.default_output_dir.clone());

    let request = DownloadRequest::new(args.url, output_dir, kind, quality)
        .map_err(|e| e.to_string())?
        .with_tools(state.tools(&settings));

    let auto_analyze = kind.is_audio()
        && args
            .auto_analyze
            .unwrap_or(settings.analysis.auto_analyze);
    let open_folder = args
        .open_folder
        .unwrap_or(settings.download.open_folder_after_download);
    let analysis_config = AnalysisConfig::from(&settings.analysis);
    let backend = state.backend(&settings);
    let session = state.session.clone();

    let (id, cancel) = session.register_download().await;
    let started = DownloadStarted {
        id,
        url: request.url.clone(),
        kind,
        quality: request.quality.clone(),
        output_dir: request.output_dir.clone(),
        open_folder,
    };
    let folder = request.output_dir.clone();
    tracing::info!("Download {} started: {} as {}", id, request.url, kind);

    let handle = tokio::spawn(async move {
        let (tx, mut rx) = mpsc::channel::<DownloadEvent>(32);

        let forward_emitter = emitter.clone();
        let forwarder = tokio::spawn(async move {
            let mut throttle = ProgressThrottle::new(150);
            while let Some(event) = rx.recv().await {
                if throttle.should_forward(&event) {
                    forward_emitter.emit_download(id, &event);
                }
            }
        });

        let outcome = backend.download(request, tx, cancel).await;
        let _ = forwarder.await;
        session.finish_download(&id).await;

        if open_folder && outcome.is_success() {
            open_output_folder(folder).await;
        }

        if auto_analyze {
            if let DownloadOutcome::Success(done) = &outcome {
                start_analysis(&session, emitter, done.file_path.clone(), analysis_config).await;
            }
        }

        outcome
    });

    Ok(DownloadTask { started, handle })
}

async fn open_output_folder(dir: PathBuf) {
    let shown = dir.display().to_string();
    match tokio::task::spawn_blocking(move || open::that(&dir)).await {
        Ok(Ok(())) => tracing::debug!("Opened {}", shown),
        Ok(Err(e)) => tracing::warn!("Failed to open {}: {}", shown, e),
        Err(e) => tracing::warn!("Failed to open {}: {}", shown, e),
    }
}

pub async fn cancel_download(state: &AppState, id: Uuid) -> Result<(), String> {
    if state.session.cancel_download(&id).await {
        tracing::info!("Download {} cancelled", id);
        Ok(())
    } else {
        Err(format!("No active download with id {}", id))
    }
}

pub async fn get_active_downloads(state: &AppState) -> Vec<Uuid> {
    state.session.active_downloads().await
}
