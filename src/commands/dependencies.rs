use serde::Serialize;
use waveget_core::core::dependencies;

use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct DependencyStatus {
    pub name: String,
    pub installed: bool,
    pub version: Option<String>,
}

pub async fn check_dependencies(state: &AppState) -> Result<Vec<DependencyStatus>, String> {
    let tools = state.tools(&state.load_settings());
    let managed = tools.managed_bin_dir.as_deref();
    let (ytdlp_version, ffmpeg_version) = tokio::join!(
        dependencies::check_version("yt-dlp", tools.ytdlp_path.as_deref(), managed),
        dependencies::check_version("ffmpeg", tools.ffmpeg_location.as_deref(), managed),
    );

    Ok(vec![
        DependencyStatus {
            name: "yt-dlp".into(),
            installed: ytdlp_version.is_some(),
            version: ytdlp_version,
        },
        DependencyStatus {
            name: "FFmpeg".into(),
            installed: ffmpeg_version.is_some(),
            version: ffmpeg_version,
        },
    ])
}
