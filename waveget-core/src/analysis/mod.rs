//! Tempo and key estimation for local audio files.
//!
//! Everything in here is synchronous and CPU bound. [`run`] moves the work
//! onto the blocking pool and reports through [`AnalysisEvent`]s.

pub mod chroma;
pub mod key;
pub mod loader;
pub mod onset;
pub mod spectrum;
pub mod tempo;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::events::AnalysisEvent;
use crate::models::settings::AnalysisSettings;

pub const STATUS_LOADING: &str = "Loading audio file...";
pub const STATUS_TEMPO: &str = "Analyzing tempo...";
pub const STATUS_KEY: &str = "Analyzing key signature...";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("no audio data")]
    NoAudioData,

    #[error("audio is silent")]
    Silent,

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("analysis cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub max_duration_secs: f64,
    pub sample_rate: u32,
    pub key_confidence_threshold: f64,
    pub tempo_agreement_bpm: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::from(&AnalysisSettings::default())
    }
}

impl From<&AnalysisSettings> for AnalysisConfig {
    fn from(s: &AnalysisSettings) -> Self {
        Self {
            max_duration_secs: s.max_duration_secs,
            sample_rate: s.sample_rate,
            key_confidence_threshold: s.key_confidence_threshold,
            tempo_agreement_bpm: s.tempo_agreement_bpm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Self {
        Self::ALL[i % 12]
    }

    pub fn name(self) -> &'static str {
        const NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];
        NAMES[self.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Mode {
    Major,
    Minor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Known { tonic: PitchClass, mode: Mode },
    Unknown,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Known { tonic, mode } => {
                let mode = match mode {
                    Mode::Major => "Major",
                    Mode::Minor => "Minor",
                };
                write!(f, "{} {}", tonic.name(), mode)
            }
            Key::Unknown => f.write_str("Unknown"),
        }
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Rounded to one decimal.
    pub tempo_bpm: f64,
    pub key: Key,
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tempo: {:.1} BPM\nKey: {}", self.tempo_bpm, self.key)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), AnalysisError> {
    if cancel.is_cancelled() {
        Err(AnalysisError::Cancelled)
    } else {
        Ok(())
    }
}

/// Decodes `path` and estimates tempo and key. `on_status` is called once
/// per stage, before it starts.
pub fn analyze_file<F: FnMut(&str)>(
    path: &Path,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
    mut on_status: F,
) -> Result<AnalysisReport, AnalysisError> {
    if !path.is_file() {
        return Err(AnalysisError::FileNotFound(path.to_path_buf()));
    }

    on_status(STATUS_LOADING);
    let signal = loader::load_mono(path, config.sample_rate, config.max_duration_secs)?;
    tracing::debug!(
        "loaded {:.1}s at {} Hz from {}",
        signal.duration_secs(),
        signal.sample_rate,
        path.display()
    );
    if signal.is_silent() {
        return Err(AnalysisError::Silent);
    }
    check_cancelled(cancel)?;

    on_status(STATUS_TEMPO);
    let spec = spectrum::stft(
        &signal.samples,
        signal.sample_rate,
        spectrum::N_FFT,
        spectrum::HOP_LENGTH,
    )?;
    let envelope = onset::onset_strength(&spec);
    let tempo_bpm = tempo::estimate(&envelope, spec.frame_rate(), config.tempo_agreement_bpm)
        .ok_or_else(|| AnalysisError::Analysis("no beat could be tracked".into()))?;
    check_cancelled(cancel)?;

    on_status(STATUS_KEY);
    let profile = chroma::mean_chroma(&spec);
    let key = key::detect(&profile, config.key_confidence_threshold);
    check_cancelled(cancel)?;

    Ok(AnalysisReport { tempo_bpm, key })
}

/// Runs [`analyze_file`] on the blocking pool, sending status events and
/// then exactly one `Finished`.
pub async fn run(
    path: PathBuf,
    config: AnalysisConfig,
    events: mpsc::UnboundedSender<AnalysisEvent>,
    cancel: CancellationToken,
) -> Result<AnalysisReport, String> {
    tracing::info!("Analyzing {}", path.display());

    let status_tx = events.clone();
    let worker_path = path.clone();
    let joined = tokio::task::spawn_blocking(move || {
        analyze_file(&worker_path, &config, &cancel, |status| {
            let _ = status_tx.send(AnalysisEvent::Status(status.to_string()));
        })
    })
    .await;

    let result = match joined {
        Ok(Ok(report)) => {
            tracing::info!("{}: {:.1} BPM, {}", path.display(), report.tempo_bpm, report.key);
            Ok(report)
        }
        Ok(Err(e)) => {
            tracing::warn!("Analysis of {} failed: {}", path.display(), e);
            Err(e.to_string())
        }
        Err(e) => {
            tracing::error!("Analysis task for {} died: {}", path.display(), e);
            Err(format!("analysis failed: {}", e))
        }
    };

    let _ = events.send(AnalysisEvent::Finished(result.clone()));
    result
}


#[cfg(test)]
mod tests {
    use super::test_audio::*;
    use super::*;

    #[test]
    fn key_display_uses_sharps() {
        let k = Key::Known {
            tonic: PitchClass::FSharp,
            mode: Mode::Minor,
        };
        assert_eq!(k.to_string(), "F# Minor");
        assert_eq!(Key::Unknown.to_string(), "Unknown");
        assert_eq!(serde_json::to_value(k).unwrap(), "F# Minor");
    }

    #[test]
    fn missing_file_is_rejected() {
        let err = analyze_file(
            Path::new("/definitely/not/here.wav"),
            &AnalysisConfig::default(),
            &CancellationToken::new(),
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::FileNotFound(_)));
    }

    #[test]
    fn click_track_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clicks.wav");
        write_wav(&path, RATE, &click_track(120.0, 12.0, RATE));

        let mut statuses = Vec::new();
        let report = analyze_file(
            &path,
            &AnalysisConfig::default(),
            &CancellationToken::new(),
            |s| statuses.push(s.to_string()),
        )
        .unwrap();

        assert!((report.tempo_bpm - 120.0).abs() < 2.0, "{}", report.tempo_bpm);
        assert_eq!(statuses, vec![STATUS_LOADING, STATUS_TEMPO, STATUS_KEY]);
        assert_eq!(report.tempo_bpm, (report.tempo_bpm * 10.0).round() / 10.0);
    }

    #[test]
    fn silent_file_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        write_wav(&path, RATE, &vec![0.0; 3 * RATE as usize]);

        let mut statuses = Vec::new();
        let err = analyze_file(
            &path,
            &AnalysisConfig::default(),
            &CancellationToken::new(),
            |s| statuses.push(s.to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::Silent));
        assert_eq!(err.to_string(), "audio is silent");
        assert_eq!(statuses, vec![STATUS_LOADING]);
    }

    #[test]
    fn cancelled_token_stops_after_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, RATE, &sine(440.0, 1.0, RATE));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = analyze_file(&path, &AnalysisConfig::default(), &cancel, |_| {}).unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled));
    }

    #[tokio::test]
    async fn run_ends_with_one_finished_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, RATE, &[]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = run(path, AnalysisConfig::default(), tx, CancellationToken::new()).await;
        assert_eq!(result, Err("no audio data".to_string()));

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert_eq!(
            events,
            vec![
                AnalysisEvent::Status(STATUS_LOADING.to_string()),
                AnalysisEvent::Finished(Err("no audio data".to_string())),
            ]
        );
    }
}
