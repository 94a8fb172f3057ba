use std::path::PathBuf;

pub const DATA_DIR_ENV: &str = "WAVEGET_DATA_DIR";

pub trait AppPaths: Send + Sync {
    fn data_dir(&self) -> PathBuf;
    fn bin_dir(&self) -> Option<PathBuf>;

    fn settings_file(&self) -> PathBuf {
        self.data_dir().join("settings.json")
    }
}

pub struct DesktopPaths;

impl AppPaths for DesktopPaths {
    fn data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .map(|d| d.join("waveget"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn bin_dir(&self) -> Option<PathBuf> {
        Some(self.data_dir().join("bin"))
    }
}

/// Paths rooted at a fixed directory. Used by portable setups and tests.
pub struct FixedPaths {
    pub root: PathBuf,
}

impl AppPaths for FixedPaths {
    fn data_dir(&self) -> PathBuf {
        self.root.clone()
    }

    fn bin_dir(&self) -> Option<PathBuf> {
        Some(self.root.join("bin"))
    }
}
