use std::path::PathBuf;

use tokio::sync::mpsc;
use waveget_core::analysis::{self, AnalysisConfig};
use waveget_core::core::events::EventEmitter;
use waveget_core::core::session::Session;

use crate::AppState;

/// Replaces whatever analysis is running in `session` with one for `path`.
/// Returns the run's generation.
pub async fn start_analysis<E: EventEmitter>(
    session: &Session,
    emitter: E,
    path: PathBuf,
    config: AnalysisConfig,
) -> u64 {
    session
        .analysis
        .start(move |ticket| async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let work = analysis::run(path, config, tx, ticket.token().clone());
            let forward = async {
                while let Some(event) = rx.recv().await {
                    ticket.deliver(|| emitter.emit_analysis(&event));
                }
            };
            let _ = tokio::join!(work, forward);
        })
        .await
}

pub async fn analyze_file<E: EventEmitter>(
    state: &AppState,
    emitter: E,
    path: PathBuf,
) -> Result<u64, String> {
    if !path.is_file() {
        return Err(format!("File not found: {}", path.display()));
    }
    let settings = state.load_settings();
    let config = AnalysisConfig::from(&settings.analysis);
    Ok(start_analysis(&state.session, emitter, path, config).await)
}
