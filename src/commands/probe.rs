use waveget_core::core::events::{EventEmitter, ProbeEvent};

use crate::AppState;

/// Fetches metadata for `url`. A newer probe replaces this one, and the
/// replaced probe's result is dropped.
pub async fn probe_media<E: EventEmitter>(
    state: &AppState,
    emitter: E,
    url: String,
) -> Result<u64, String> {
    let url = url.trim().to_string();
    if url.is_empty() {
        return Err("Please enter a URL".into());
    }

    let settings = state.load_settings();
    let backend = state.backend(&settings);
    tracing::debug!("probe {} via {}", url, backend.name());

    let generation = state
        .session
        .probe
        .start(move |ticket| async move {
            let result = tokio::select! {
                _ = ticket.token().cancelled() => return,
                r = backend.fetch_metadata(&url) => r,
            };
            if let Err(ref e) = result {
                tracing::warn!("Probe of {} failed: {}", url, e);
            }
            let event = ProbeEvent::Finished(result.map_err(|e| e.to_string()));
            ticket.deliver(|| emitter.emit_probe(&url, &event));
        })
        .await;

    Ok(generation)
}
