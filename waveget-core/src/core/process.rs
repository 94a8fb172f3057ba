use std::path::{Path, PathBuf};

fn enhanced_path(extra: &[&Path]) -> Option<String> {
    if extra.is_empty() {
        return None;
    }
    let sep = if cfg!(windows) { ";" } else { ":" };
    let current = std::env::var("PATH").unwrap_or_default();
    let mut parts: Vec<String> = extra.iter().map(|d| d.display().to_string()).collect();
    parts.push(current);
    Some(parts.join(sep))
}

/// Directory part of a configured ffmpeg location, which may name either the
/// directory or the binary itself.
pub fn ffmpeg_dir(location: &Path) -> PathBuf {
    if location.is_file() {
        location
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| location.to_path_buf())
    } else {
        location.to_path_buf()
    }
}

pub fn command<S: AsRef<std::ffi::OsStr>>(program: S) -> tokio::process::Command {
    command_with_path(program, &[])
}

/// Like [`command`], with `extra_dirs` put in front of `PATH`.
pub fn command_with_path<S: AsRef<std::ffi::OsStr>>(
    program: S,
    extra_dirs: &[&Path],
) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(0x08000000);
    if let Some(path) = enhanced_path(extra_dirs) {
        cmd.env("PATH", path);
    }
    cmd.env("PYTHONIOENCODING", "utf-8");
    cmd.env("PYTHONUTF8", "1");
    cmd.kill_on_drop(true);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enhanced_path_puts_extra_dirs_first() {
        let path = enhanced_path(&[Path::new("/opt/ffmpeg/bin"), Path::new("/data/bin")]).unwrap();
        let sep = if cfg!(windows) { ";" } else { ":" };
        assert!(path.starts_with(&format!("/opt/ffmpeg/bin{sep}/data/bin{sep}")));
        assert_eq!(enhanced_path(&[]), None);
    }

    #[test]
    fn ffmpeg_dir_of_binary_is_parent() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("ffmpeg");
        std::fs::write(&bin, b"").unwrap();
        assert_eq!(ffmpeg_dir(&bin), dir.path());
        assert_eq!(ffmpeg_dir(dir.path()), dir.path());
    }
}
