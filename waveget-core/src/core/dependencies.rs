use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::anyhow;

use crate::core::process;
use crate::models::settings::ToolSettings;

fn bin_name(tool: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}

fn version_flag_for(tool: &str) -> &'static str {
    match tool {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    }
}

/// Looks for `tool` in `preferred` (file or directory), then on `PATH`,
/// then in `managed_dir`.
pub async fn find_tool(
    tool: &str,
    preferred: Option<&Path>,
    managed_dir: Option<&Path>,
) -> Option<PathBuf> {
    let name = bin_name(tool);

    if let Some(p) = preferred {
        let candidate = if p.is_dir() { p.join(&name) } else { p.to_path_buf() };
        if candidate.exists() {
            tracing::debug!("find_tool({}): configured {}", tool, candidate.display());
            return Some(candidate);
        }
        tracing::warn!("Configured {} location {} does not exist", tool, p.display());
    }

    if let Ok(status) = process::command(&name)
        .arg(version_flag_for(tool))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        if status.success() {
            return Some(PathBuf::from(&name));
        }
    }

    if let Some(dir) = managed_dir {
        let managed = dir.join(&name);
        if managed.exists() {
            return Some(managed);
        }
    }

    tracing::debug!("find_tool({}): not found", tool);
    None
}

pub async fn check_version(
    tool: &str,
    preferred: Option<&Path>,
    managed_dir: Option<&Path>,
) -> Option<String> {
    let path = find_tool(tool, preferred, managed_dir).await?;
    let output = process::command(&path)
        .arg(version_flag_for(tool))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_version(tool, stdout.lines().next().unwrap_or(""))
}

fn parse_version(tool: &str, first_line: &str) -> Option<String> {
    if tool == "ffmpeg" || tool == "ffprobe" {
        first_line.split_whitespace().nth(2).map(|s| s.to_string())
    } else {
        let v = first_line.trim();
        (!v.is_empty()).then(|| v.to_string())
    }
}

pub async fn resolve_ytdlp(tools: &ToolSettings) -> anyhow::Result<PathBuf> {
    find_tool(
        "yt-dlp",
        tools.ytdlp_path.as_deref(),
        tools.managed_bin_dir.as_deref(),
    )
    .await
        .ok_or_else(|| anyhow!("yt-dlp not found; install it or set tools.ytdlp_path"))
}
