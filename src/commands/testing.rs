use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use waveget_core::core::backend::MediaBackend;
use waveget_core::core::events::{
    AnalysisEvent, DownloadEvent, DownloadPhase, DownloadProgress, EventEmitter, ProbeEvent,
};
use waveget_core::fs_paths::FixedPaths;
use waveget_core::models::media::{
    CompletedDownload, DownloadOutcome, DownloadRequest, OutputKind, VideoMetadata,
};

use crate::AppState;

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Download(Uuid, DownloadEvent),
    Analysis(AnalysisEvent),
    Probe(String, ProbeEvent),
}

#[derive(Clone, Default)]
pub struct RecordingEmitter {
    pub events: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingEmitter {
    pub fn snapshot(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn analysis(&self) -> Vec<AnalysisEvent> {
        self.snapshot()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Analysis(e) => Some(e),
                _ => None,
            })
            .collect()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_download(&self, id: Uuid, event: &DownloadEvent) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Download(id, event.clone()));
    }

    fn emit_analysis(&self, event: &AnalysisEvent) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Analysis(event.clone()));
    }

    fn emit_probe(&self, url: &str, event: &ProbeEvent) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Probe(url.to_string(), event.clone()));
    }
}

/// Stands in for yt-dlp. URLs steer it: `slow` delays the probe, `fail`
/// fails the download, `hang` blocks until cancelled.
pub struct FakeBackend;

/// Twelve seconds of 1 kHz clicks at 120 BPM.
pub fn write_clicks(path: &Path) {
    const RATE: u32 = 22_050;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let period = (RATE / 2) as usize;
    let click_len = (0.02 * RATE as f32) as usize;
    let mut w = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..12 * RATE as usize {
        let offset = i % period;
        let s = if offset < click_len {
            let t = offset as f32 / RATE as f32;
            let decay = (-(offset as f32) / (click_len as f32 / 5.0)).exp();
            0.9 * decay * (2.0 * std::f32::consts::PI * 1000.0 * t).sin()
        } else {
            0.0
        };
        w.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    w.finalize().unwrap();
}

#[async_trait]
impl MediaBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_metadata(&self, url: &str) -> anyhow::Result<VideoMetadata> {
        if url.contains("slow") {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        Ok(VideoMetadata {
            title: url.to_string(),
            duration_seconds: 61,
            uploader: "Fake".into(),
            view_count: 1_200,
        })
    }

    async fn download(
        &self,
        request: DownloadRequest,
        events: mpsc::Sender<DownloadEvent>,
        cancel: CancellationToken,
    ) -> DownloadOutcome {
        let _ = events
            .send(DownloadEvent::Progress(DownloadProgress {
                phase: DownloadPhase::Downloading,
                percent: Some(50.0),
                speed_bytes_per_sec: Some(1024.0),
                eta_seconds: Some(1),
                status: "Downloading... 50.0%".into(),
            }))
            .await;

        let outcome = if request.url.contains("hang") {
            cancel.cancelled().await;
            DownloadOutcome::failure("Download cancelled")
        } else if request.url.contains("fail") {
            DownloadOutcome::failure("HTTP Error 404: Not Found")
        } else {
            let file = request
                .output_dir
                .join(format!("Fake.{}", request.kind.extension()));
            match request.kind {
                OutputKind::Video => std::fs::write(&file, b"not really mp4").unwrap(),
                _ => write_clicks(&file),
            }
            DownloadOutcome::Success(CompletedDownload {
                file_size_bytes: std::fs::metadata(&file).unwrap().len(),
                file_path: file,
                kind: request.kind,
                completed_at: Utc::now(),
            })
        };

        let _ = events.send(DownloadEvent::Finished(outcome.clone())).await;
        outcome
    }
}

pub fn fake_state(root: &Path) -> AppState {
    AppState::with_backend(
        Arc::new(FixedPaths {
            root: root.to_path_buf(),
        }),
        Arc::new(FakeBackend),
    )
}
