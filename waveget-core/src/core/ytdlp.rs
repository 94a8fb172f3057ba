use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use anyhow::anyhow;
use regex::Regex;

use crate::core::process;
use crate::models::media::OutputKind;
use crate::models::settings::ToolSettings;

pub const VIDEO_HEIGHT_TIERS: [u32; 5] = [480, 720, 1080, 1440, 2160];

const PROGRESS_MARKER: &str = "waveget-progress";

static DESTINATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[download\] Destination: (.+)$").unwrap());
static ALREADY_DOWNLOADED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[download\] (.+) has already been downloaded").unwrap());
static MERGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\[Merger\] Merging formats into "(.+)"$"#).unwrap());
static REMUXER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[VideoRemuxer\] Remuxing video from \S+ to \S+; Destination: (.+)$").unwrap()
});
static EXTRACT_AUDIO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[ExtractAudio\] Destination: (.+)$").unwrap());

/// Maps a video quality selector onto one of the known height tiers.
/// Anything else means "best available".
pub fn parse_height_tier(quality: &str) -> Option<u32> {
    let s = quality.trim().to_lowercase();
    let height = s.trim_end_matches('p').parse::<u32>().ok()?;
    VIDEO_HEIGHT_TIERS.contains(&height).then_some(height)
}

/// Numeric prefix of a bitrate string: `"128k"` -> 128, `"320 kbps"` -> 320.
pub fn parse_bitrate_kbps(quality: &str) -> Option<u32> {
    let digits: String = quality
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u32>().ok().filter(|v| *v > 0)
}

pub fn format_selector(kind: OutputKind, quality: &str) -> String {
    match kind {
        OutputKind::Video => match parse_height_tier(quality) {
            Some(h) => format!("bv*[height<={h}]+ba/b[height<={h}]"),
            None => "bv*+ba/b".to_string(),
        },
        OutputKind::AudioLossless | OutputKind::AudioLossy => "bestaudio/best".to_string(),
    }
}

pub fn progress_template() -> String {
    format!(
        "download:{PROGRESS_MARKER}|%(progress.status)s|%(progress.downloaded_bytes)s|\
         %(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|\
         %(progress.eta)s|%(progress.filename)s"
    )
}

pub fn build_download_args(
    url: &str,
    output_dir: &Path,
    kind: OutputKind,
    quality: &str,
    tools: &ToolSettings,
) -> Vec<String> {
    let output_template = output_dir
        .join(&tools.filename_template)
        .to_string_lossy()
        .to_string();

    let mut args = vec!["-f".to_string(), format_selector(kind, quality)];

    match kind {
        OutputKind::Video => {
            // Single-file fallbacks are never merged, so remux those too.
            args.push("--merge-output-format".to_string());
            args.push(kind.extension().to_string());
            args.push("--remux-video".to_string());
            args.push(kind.extension().to_string());
        }
        OutputKind::AudioLossless | OutputKind::AudioLossy => {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(kind.audio_codec().unwrap_or("wav").to_string());
            if kind == OutputKind::AudioLossy {
                match parse_bitrate_kbps(quality) {
                    Some(kbps) => {
                        args.push("--audio-quality".to_string());
                        args.push(format!("{kbps}K"));
                    }
                    None => {
                        tracing::warn!(
                            "Unrecognised bitrate '{}', leaving audio quality to yt-dlp",
                            quality
                        );
                    }
                }
            }
        }
    }

    if let Some(ref location) = tools.ffmpeg_location {
        args.push("--ffmpeg-location".to_string());
        args.push(location.to_string_lossy().to_string());
    }

    args.extend([
        "--no-playlist".to_string(),
        "--no-mtime".to_string(),
        "--no-warnings".to_string(),
        "--newline".to_string(),
        "--progress-template".to_string(),
        progress_template(),
        "-o".to_string(),
        output_template,
        url.to_string(),
    ]);

    args
}

/// One progress report as printed through [`progress_template`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawProgress {
    pub status: String,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    pub speed: Option<f64>,
    pub eta: Option<u64>,
    pub filename: Option<PathBuf>,
}

impl RawProgress {
    pub fn is_finished(&self) -> bool {
        self.status == "finished"
    }

    pub fn known_total(&self) -> Option<u64> {
        self.total_bytes
            .or(self.total_bytes_estimate)
            .filter(|t| *t > 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Progress(RawProgress),
    Destination(PathBuf),
    Merged(PathBuf),
    Remuxed(PathBuf),
    ExtractedAudio(PathBuf),
    Other,
}

fn parse_number(field: &str) -> Option<f64> {
    let v = field.trim();
    if v.is_empty() || v == "NA" || v == "None" {
        return None;
    }
    v.parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0)
}

pub fn parse_output_line(line: &str) -> OutputLine {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(rest) = line.strip_prefix(PROGRESS_MARKER) {
        let mut fields = rest.trim_start_matches('|').splitn(7, '|');
        let status = fields.next().unwrap_or("").trim().to_string();
        let downloaded = fields.next().and_then(parse_number);
        let total = fields.next().and_then(parse_number);
        let estimate = fields.next().and_then(parse_number);
        let speed = fields.next().and_then(parse_number);
        let eta = fields.next().and_then(parse_number);
        let filename = fields
            .next()
            .map(str::trim)
            .filter(|f| !f.is_empty() && *f != "NA")
            .map(PathBuf::from);
        return OutputLine::Progress(RawProgress {
            status,
            downloaded_bytes: downloaded.map(|v| v as u64),
            total_bytes: total.map(|v| v as u64),
            total_bytes_estimate: estimate.map(|v| v as u64),
            speed,
            eta: eta.map(|v| v as u64),
            filename,
        });
    }

    let trimmed = line.trim();
    if let Some(c) = MERGER_RE.captures(trimmed) {
        return OutputLine::Merged(PathBuf::from(&c[1]));
    }
    if let Some(c) = REMUXER_RE.captures(trimmed) {
        return OutputLine::Remuxed(PathBuf::from(&c[1]));
    }
    if let Some(c) = EXTRACT_AUDIO_RE.captures(trimmed) {
        return OutputLine::ExtractedAudio(PathBuf::from(&c[1]));
    }
    if let Some(c) = DESTINATION_RE.captures(trimmed) {
        return OutputLine::Destination(PathBuf::from(&c[1]));
    }
    if let Some(c) = ALREADY_DOWNLOADED_RE.captures(trimmed) {
        return OutputLine::Destination(PathBuf::from(&c[1]));
    }

    OutputLine::Other
}

/// Picks the most useful line out of yt-dlp's stderr for a failure message.
pub fn error_message_from_stderr(stderr_lines: &[String]) -> Option<String> {
    stderr_lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr_lines.iter().rev().find(|l| !l.trim().is_empty()))
        .map(|l| l.trim_start_matches("ERROR:").trim().to_string())
}

pub async fn get_video_info(ytdlp: &Path, url: &str) -> anyhow::Result<serde_json::Value> {
    tracing::debug!("yt-dlp --dump-json {}", url);
    let output = process::command(ytdlp)
        .args([
            "--dump-json",
            "--skip-download",
            "--no-warnings",
            "--no-playlist",
            url,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| anyhow!("Failed to run yt-dlp: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<String> = stderr.lines().map(str::to_string).collect();
        let message = error_message_from_stderr(&lines)
            .unwrap_or_else(|| format!("exit status {}", output.status));
        return Err(anyhow!("yt-dlp failed: {}", message));
    }

    let json: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| anyhow!("yt-dlp returned invalid JSON: {}", e))?;

    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tiers_cap_height() {
        assert_eq!(
            format_selector(OutputKind::Video, "720p"),
            "bv*[height<=720]+ba/b[height<=720]"
        );
        assert_eq!(
            format_selector(OutputKind::Video, "2160"),
            "bv*[height<=2160]+ba/b[height<=2160]"
        );
    }

    #[test]
    fn unknown_tier_means_best() {
        assert_eq!(format_selector(OutputKind::Video, "best"), "bv*+ba/b");
        assert_eq!(format_selector(OutputKind::Video, "360p"), "bv*+ba/b");
        assert_eq!(format_selector(OutputKind::Video, "garbage"), "bv*+ba/b");
    }

    #[test]
    fn audio_selects_best_audio_stream() {
        assert_eq!(format_selector(OutputKind::AudioLossy, "128k"), "bestaudio/best");
        assert_eq!(format_selector(OutputKind::AudioLossless, "320k"), "bestaudio/best");
    }

    #[test]
    fn bitrate_strips_unit() {
        assert_eq!(parse_bitrate_kbps("128k"), Some(128));
        assert_eq!(parse_bitrate_kbps("320K"), Some(320));
        assert_eq!(parse_bitrate_kbps(" 192 kbps"), Some(192));
        assert_eq!(parse_bitrate_kbps("best"), None);
        assert_eq!(parse_bitrate_kbps("0k"), None);
    }

    #[test]
    fn lossy_args_carry_bitrate() {
        let args = build_download_args(
            "https://example.com/v",
            Path::new("/music"),
            OutputKind::AudioLossy,
            "128k",
            &ToolSettings::default(),
        );
        let pos = args.iter().position(|a| a == "--audio-quality").unwrap();
        assert_eq!(args[pos + 1], "128K");
        let pos = args.iter().position(|a| a == "--audio-format").unwrap();
        assert_eq!(args[pos + 1], "mp3");
        assert!(args.contains(&"-x".to_string()));
        assert_eq!(args.last().unwrap(), "https://example.com/v");
    }

    #[test]
    fn lossless_args_have_no_bitrate() {
        let args = build_download_args(
            "https://example.com/v",
            Path::new("/music"),
            OutputKind::AudioLossless,
            "320k",
            &ToolSettings::default(),
        );
        assert!(!args.contains(&"--audio-quality".to_string()));
        let pos = args.iter().position(|a| a == "--audio-format").unwrap();
        assert_eq!(args[pos + 1], "wav");
    }

    #[test]
    fn video_args_merge_to_mp4_and_pass_ffmpeg() {
        let tools = ToolSettings {
            ffmpeg_location: Some(PathBuf::from("/opt/ffmpeg/bin")),
            ..ToolSettings::default()
        };
        let args = build_download_args(
            "https://example.com/v",
            Path::new("/videos"),
            OutputKind::Video,
            "1080p",
            &tools,
        );
        let pos = args.iter().position(|a| a == "--merge-output-format").unwrap();
        assert_eq!(args[pos + 1], "mp4");
        let pos = args.iter().position(|a| a == "--remux-video").unwrap();
        assert_eq!(args[pos + 1], "mp4");
        let pos = args.iter().position(|a| a == "--ffmpeg-location").unwrap();
        assert_eq!(args[pos + 1], "/opt/ffmpeg/bin");
        let pos = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(
            PathBuf::from(&args[pos + 1]),
            Path::new("/videos").join("%(title)s.%(ext)s")
        );
        assert!(!args.contains(&"-x".to_string()));
    }

    #[test]
    fn audio_args_do_not_remux() {
        let args = build_download_args(
            "https://example.com/v",
            Path::new("/music"),
            OutputKind::AudioLossless,
            "best",
            &ToolSettings::default(),
        );
        assert!(!args.contains(&"--remux-video".to_string()));
        assert!(!args.contains(&"--merge-output-format".to_string()));
    }

    #[test]
    fn parses_progress_with_known_total() {
        let line = "waveget-progress|downloading|1048576|4194304|NA|524288.0|6|/music/Song.webm";
        match parse_output_line(line) {
            OutputLine::Progress(p) => {
                assert_eq!(p.status, "downloading");
                assert_eq!(p.downloaded_bytes, Some(1_048_576));
                assert_eq!(p.known_total(), Some(4_194_304));
                assert_eq!(p.speed, Some(524_288.0));
                assert_eq!(p.eta, Some(6));
                assert_eq!(p.filename, Some(PathBuf::from("/music/Song.webm")));
                assert!(!p.is_finished());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_progress_with_estimated_total() {
        let line = "waveget-progress|downloading|100|NA|400.5|NA|NA|a.webm";
        match parse_output_line(line) {
            OutputLine::Progress(p) => {
                assert_eq!(p.total_bytes, None);
                assert_eq!(p.known_total(), Some(400));
                assert_eq!(p.speed, None);
                assert_eq!(p.eta, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn progress_filename_may_contain_separator() {
        let line = "waveget-progress|finished|10|10|NA|NA|NA|/music/A | B.webm";
        match parse_output_line(line) {
            OutputLine::Progress(p) => {
                assert!(p.is_finished());
                assert_eq!(p.filename, Some(PathBuf::from("/music/A | B.webm")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_postprocessor_lines() {
        assert_eq!(
            parse_output_line("[download] Destination: /music/Song.webm"),
            OutputLine::Destination(PathBuf::from("/music/Song.webm"))
        );
        assert_eq!(
            parse_output_line(r#"[Merger] Merging formats into "/videos/Clip.mp4""#),
            OutputLine::Merged(PathBuf::from("/videos/Clip.mp4"))
        );
        assert_eq!(
            parse_output_line(
                "[VideoRemuxer] Remuxing video from webm to mp4; Destination: /videos/Clip.mp4"
            ),
            OutputLine::Remuxed(PathBuf::from("/videos/Clip.mp4"))
        );
        assert_eq!(
            parse_output_line(r#"[VideoRemuxer] Not remuxing media file "/videos/Clip.mp4"; already is in target format mp4"#),
            OutputLine::Other
        );
        assert_eq!(
            parse_output_line("[ExtractAudio] Destination: /music/Song.mp3"),
            OutputLine::ExtractedAudio(PathBuf::from("/music/Song.mp3"))
        );
        assert_eq!(
            parse_output_line("[download] /music/Song.webm has already been downloaded"),
            OutputLine::Destination(PathBuf::from("/music/Song.webm"))
        );
        assert_eq!(parse_output_line("[youtube] abc: Downloading webpage"), OutputLine::Other);
    }

    #[test]
    fn stderr_prefers_error_lines() {
        let lines = vec![
            "WARNING: something".to_string(),
            "ERROR: [youtube] abc: Video unavailable".to_string(),
            "".to_string(),
        ];
        assert_eq!(
            error_message_from_stderr(&lines).as_deref(),
            Some("[youtube] abc: Video unavailable")
        );
        assert_eq!(error_message_from_stderr(&[]), None);
    }
}
