//! Download-and-convert worker: one yt-dlp pass per request.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::anyhow;
use chrono::Utc;
use filetime::FileTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::events::{DownloadEvent, DownloadPhase, DownloadProgress};
use crate::core::ytdlp::{self, OutputLine, RawProgress};
use crate::core::{dependencies, ffmpeg, process};
use crate::models::media::{CompletedDownload, DownloadOutcome, DownloadRequest, OutputKind};

/// Turns raw yt-dlp reports into [`DownloadProgress`] events. Percent never
/// goes backwards within a run, even across the separate video and audio
/// streams of a merged download.
#[derive(Debug)]
pub struct ProgressTracker {
    kind: OutputKind,
    max_percent: f64,
    finished: bool,
}

impl ProgressTracker {
    pub fn new(kind: OutputKind) -> Self {
        Self {
            kind,
            max_percent: 0.0,
            finished: false,
        }
    }

    pub fn transfer_finished(&self) -> bool {
        self.finished
    }

    pub fn observe(&mut self, raw: &RawProgress) -> DownloadProgress {
        if raw.is_finished() {
            self.finished = true;
            self.max_percent = 100.0;
            let (phase, status) = if self.kind.is_audio() {
                (DownloadPhase::Converting, "Download completed, converting...")
            } else {
                (DownloadPhase::Completed, "Download completed!")
            };
            return DownloadProgress {
                phase,
                percent: Some(100.0),
                speed_bytes_per_sec: None,
                eta_seconds: None,
                status: status.to_string(),
            };
        }

        let percent = match (raw.downloaded_bytes, raw.known_total()) {
            (Some(done), Some(total)) => {
                let pct = (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
                self.max_percent = self.max_percent.max(pct);
                Some(self.max_percent)
            }
            _ => None,
        };

        DownloadProgress {
            phase: DownloadPhase::Downloading,
            percent,
            speed_bytes_per_sec: raw.speed,
            eta_seconds: raw.eta,
            status: status_line(percent, raw.speed, raw.eta),
        }
    }
}

fn status_line(percent: Option<f64>, speed: Option<f64>, eta: Option<u64>) -> String {
    let Some(pct) = percent else {
        return "Downloading...".to_string();
    };
    let speed_kbps = speed.map(|s| s / 1024.0).unwrap_or(0.0);
    let eta = eta.unwrap_or(0);
    format!("Downloading... {pct:.1}% | Speed: {speed_kbps:.1} KB/s | ETA: {eta} sec")
}

/// Where the finished file lives once post-processing is done.
///
/// Audio extraction rewrites the extension of the downloaded file. Video ends
/// up at the merger's or remuxer's output, and otherwise in the target
/// container next to the download.
pub fn resolve_final_path(
    kind: OutputKind,
    output_dir: &Path,
    downloaded: Option<&Path>,
    muxed: Option<&Path>,
) -> Option<PathBuf> {
    let absolute = |p: &Path| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            output_dir.join(p)
        }
    };

    match kind {
        OutputKind::AudioLossless | OutputKind::AudioLossy => {
            downloaded.map(|p| absolute(p).with_extension(kind.extension()))
        }
        OutputKind::Video => muxed
            .map(absolute)
            .or_else(|| downloaded.map(|p| absolute(p).with_extension(kind.extension()))),
    }
}

/// Confirms the output exists and stamps it with the acquisition time.
pub async fn finalize(path: &Path, kind: OutputKind) -> anyhow::Result<CompletedDownload> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| anyhow!("Converted file not found at {}", path.display()))?;

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || filetime::set_file_mtime(&target, FileTime::now()))
        .await
        .map_err(|e| anyhow!("Failed to update file time: {}", e))??;

    let file_path = tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf());

    Ok(CompletedDownload {
        file_path,
        kind,
        file_size_bytes: meta.len(),
        completed_at: Utc::now(),
    })
}

/// Runs one download for `request`, sending progress and then exactly one
/// [`DownloadEvent::Finished`]. The same outcome is returned.
pub async fn run(
    request: DownloadRequest,
    events: mpsc::Sender<DownloadEvent>,
    cancel: CancellationToken,
) -> DownloadOutcome {
    tracing::info!(
        "Starting {} download of {} into {}",
        request.kind,
        request.url,
        request.output_dir.display()
    );

    let outcome = match download(&request, &events, &cancel).await {
        Ok(done) => {
            tracing::info!("Download finished: {}", done.file_path.display());
            let _ = events
                .send(DownloadEvent::Progress(DownloadProgress {
                    phase: DownloadPhase::Completed,
                    percent: Some(100.0),
                    speed_bytes_per_sec: None,
                    eta_seconds: None,
                    status: "Download completed!".to_string(),
                }))
                .await;
            DownloadOutcome::Success(done)
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!("Download of {} failed: {}", request.url, message);
            let _ = events
                .send(DownloadEvent::Progress(DownloadProgress::status(
                    DownloadPhase::Failed,
                    format!("Error: {message}"),
                )))
                .await;
            DownloadOutcome::failure(message)
        }
    };

    let _ = events.send(DownloadEvent::Finished(outcome.clone())).await;
    outcome
}

async fn download(
    request: &DownloadRequest,
    events: &mpsc::Sender<DownloadEvent>,
    cancel: &CancellationToken,
) -> anyhow::Result<CompletedDownload> {
    let ytdlp = dependencies::resolve_ytdlp(&request.tools).await?;
    ffmpeg::ensure_for(request.kind, &request.tools).await?;

    tokio::fs::create_dir_all(&request.output_dir)
        .await
        .map_err(|e| anyhow!("Cannot create {}: {}", request.output_dir.display(), e))?;

    let args = ytdlp::build_download_args(
        &request.url,
        &request.output_dir,
        request.kind,
        &request.quality,
        &request.tools,
    );
    tracing::debug!("yt-dlp {:?}", args);

    let ffmpeg_dir = request
        .tools
        .ffmpeg_location
        .as_deref()
        .map(process::ffmpeg_dir);

    let extra_dirs: Vec<&Path> = ffmpeg_dir
        .as_deref()
        .into_iter()
        .chain(request.tools.managed_bin_dir.as_deref())
        .collect();

    let mut child = process::command_with_path(&ytdlp, &extra_dirs)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| anyhow!("Failed to start yt-dlp: {}", e))?;

    let stdout = child.stdout.take().ok_or_else(|| anyhow!("yt-dlp has no stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| anyhow!("yt-dlp has no stderr"))?;

    let stderr_reader = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut collected = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!("yt-dlp stderr: {}", line);
            collected.push(line);
        }
        collected
    });

    let _ = events
        .send(DownloadEvent::Progress(DownloadProgress::status(
            DownloadPhase::Downloading,
            "Starting download...",
        )))
        .await;

    let mut lines = BufReader::new(stdout).lines();
    let mut tracker = ProgressTracker::new(request.kind);
    let mut downloaded: Option<PathBuf> = None;
    let mut muxed: Option<PathBuf> = None;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(anyhow!("Download cancelled"));
            }
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Lost yt-dlp output: {}", e);
                break;
            }
        };

        match ytdlp::parse_output_line(&line) {
            OutputLine::Progress(raw) => {
                if let Some(ref name) = raw.filename {
                    downloaded = Some(name.clone());
                }
                let progress = tracker.observe(&raw);
                let _ = events.send(DownloadEvent::Progress(progress)).await;
            }
            OutputLine::Destination(path) => downloaded = Some(path),
            OutputLine::Merged(path) | OutputLine::Remuxed(path) => muxed = Some(path),
            OutputLine::ExtractedAudio(path) => {
                tracing::debug!("ffmpeg extracting audio to {}", path.display());
            }
            OutputLine::Other => tracing::trace!("yt-dlp: {}", line),
        }
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            return Err(anyhow!("Download cancelled"));
        }
        status = child.wait() => status.map_err(|e| anyhow!("yt-dlp process failed: {}", e))?,
    };

    let stderr_lines = stderr_reader.await.unwrap_or_default();

    if !status.success() {
        let message = ytdlp::error_message_from_stderr(&stderr_lines)
            .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
        return Err(anyhow!(message));
    }

    if !tracker.transfer_finished() {
        tracing::debug!("yt-dlp exited without a finished progress report");
    }

    let final_path = resolve_final_path(
        request.kind,
        &request.output_dir,
        downloaded.as_deref(),
        muxed.as_deref(),
    )
    .ok_or_else(|| anyhow!("yt-dlp did not report an output file"))?;

    finalize(&final_path, request.kind).await
}
