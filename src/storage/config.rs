use std::path::Path;

use anyhow::Context;
use waveget_core::fs_paths::AppPaths;
use waveget_core::models::settings::AppSettings;

/// Reads `settings.json`. A missing or unreadable file yields defaults.
pub fn load_settings(paths: &dyn AppPaths) -> AppSettings {
    load_from(&paths.settings_file())
}

fn load_from(file: &Path) -> AppSettings {
    let raw = match std::fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AppSettings::default(),
        Err(e) => {
            tracing::warn!("Cannot read {}: {}", file.display(), e);
            return AppSettings::default();
        }
    };

    serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
        tracing::warn!("Ignoring invalid settings in {}: {}", file.display(), e);
        AppSettings::default()
    })
}

pub fn save_settings(paths: &dyn AppPaths, settings: &AppSettings) -> anyhow::Result<()> {
    let file = paths.settings_file();
    if let Some(dir) = file.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create {}", dir.display()))?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    let tmp = file.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Cannot write {}", tmp.display()))?;
    std::fs::rename(&tmp, &file).with_context(|| format!("Cannot replace {}", file.display()))?;
    Ok(())
}
