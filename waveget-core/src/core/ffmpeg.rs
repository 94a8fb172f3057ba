use std::process::Stdio;

use anyhow::anyhow;

use crate::core::{dependencies, process};
use crate::models::media::OutputKind;
use crate::models::settings::ToolSettings;

/// True when ffmpeg answers `-version` from the configured location, PATH
/// or the managed bin dir.
pub async fn is_ffmpeg_available(tools: &ToolSettings) -> bool {
    let found = dependencies::find_tool(
        "ffmpeg",
        tools.ffmpeg_location.as_deref(),
        tools.managed_bin_dir.as_deref(),
    )
    .await;
    let Some(path) = found else {
        return false;
    };
    process::command(&path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Audio extraction cannot run without ffmpeg. Video only needs it when
/// separate streams get merged, so its absence is just logged.
pub async fn ensure_for(kind: OutputKind, tools: &ToolSettings) -> anyhow::Result<()> {
    if is_ffmpeg_available(tools).await {
        return Ok(());
    }
    if kind.is_audio() {
        return Err(anyhow!(
            "ffmpeg not found; audio extraction needs it (set tools.ffmpeg_location)"
        ));
    }
    tracing::warn!("ffmpeg not found; only single-stream video formats will work");
    Ok(())
}
