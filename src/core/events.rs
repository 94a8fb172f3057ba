use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;
use waveget_core::core::events::{AnalysisEvent, DownloadEvent, EventEmitter, ProbeEvent};
use waveget_core::core::probe::MetadataSummary;
use waveget_core::models::media::DownloadOutcome;

/// Writes worker events to stdout, either as text or one JSON object per
/// line. Remembers whether any run failed so the binary can pick an exit
/// code.
#[derive(Clone, Default)]
pub struct ConsoleEventEmitter {
    json: bool,
    failed: Arc<AtomicBool>,
}

impl ConsoleEventEmitter {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn had_failure(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn print_json(&self, value: serde_json::Value) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", value);
    }

    fn print(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", line);
    }
}

impl EventEmitter for ConsoleEventEmitter {
    fn emit_download(&self, id: Uuid, event: &DownloadEvent) {
        if let DownloadEvent::Finished(DownloadOutcome::Failure { .. }) = event {
            self.failed.store(true, Ordering::SeqCst);
        }

        if self.json {
            self.print_json(serde_json::json!({ "download": id, "event": event }));
            return;
        }

        match event {
            DownloadEvent::Progress(p) => self.print(&p.status),
            DownloadEvent::Finished(DownloadOutcome::Success(done)) => self.print(&format!(
                "Saved {} ({:.1} MB)",
                done.file_path.display(),
                done.file_size_bytes as f64 / 1_048_576.0
            )),
            DownloadEvent::Finished(DownloadOutcome::Failure { message }) => {
                self.print(&format!("Download failed: {}", message))
            }
        }
    }

    fn emit_analysis(&self, event: &AnalysisEvent) {
        if let AnalysisEvent::Finished(Err(_)) = event {
            self.failed.store(true, Ordering::SeqCst);
        }

        if self.json {
            self.print_json(serde_json::json!({ "analysis": event }));
            return;
        }

        match event {
            AnalysisEvent::Status(status) => self.print(status),
            AnalysisEvent::Finished(Ok(report)) => self.print(&report.to_string()),
            AnalysisEvent::Finished(Err(e)) => self.print(&format!("Analysis failed: {}", e)),
        }
    }

    fn emit_probe(&self, url: &str, event: &ProbeEvent) {
        let ProbeEvent::Finished(result) = event;
        if result.is_err() {
            self.failed.store(true, Ordering::SeqCst);
        }

        if self.json {
            self.print_json(serde_json::json!({ "probe": url, "event": event }));
            return;
        }

        match result {
            Ok(meta) => self.print(&MetadataSummary::from(meta).to_string()),
            Err(e) => self.print(&format!("Error fetching info: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_remembered_across_clones() {
        let emitter = ConsoleEventEmitter::new(true);
        let clone = emitter.clone();
        assert!(!emitter.had_failure());

        clone.emit_probe("https://x", &ProbeEvent::Finished(Err("boom".into())));
        assert!(emitter.had_failure());
    }
}
