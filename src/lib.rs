use std::sync::Arc;
use std::time::Duration;

use waveget_core::core::backend::{MediaBackend, YtDlpBackend};
use waveget_core::core::session::Session;
use waveget_core::fs_paths::{AppPaths, DesktopPaths};
use waveget_core::models::settings::{AppSettings, ToolSettings};

pub mod cli;
pub mod commands;
pub mod core;
pub mod storage;

pub struct AppState {
    pub session: Arc<Session>,
    pub paths: Arc<dyn AppPaths>,
    backend: Option<Arc<dyn MediaBackend>>,
}

impl AppState {
    pub fn new(paths: Arc<dyn AppPaths>) -> Self {
        Self {
            session: Arc::new(Session::new()),
            paths,
            backend: None,
        }
    }

    /// State whose probes and downloads all go through `backend`.
    pub fn with_backend(paths: Arc<dyn AppPaths>, backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend: Some(backend),
            ..Self::new(paths)
        }
    }

    pub fn load_settings(&self) -> AppSettings {
        storage::config::load_settings(self.paths.as_ref())
    }

    /// Configured tool locations plus this state's managed bin dir.
    pub fn tools(&self, settings: &AppSettings) -> ToolSettings {
        ToolSettings {
            managed_bin_dir: self.paths.bin_dir(),
            ..settings.tools.clone()
        }
    }

    pub fn backend(&self, settings: &AppSettings) -> Arc<dyn MediaBackend> {
        if let Some(b) = &self.backend {
            return b.clone();
        }
        let timeout = match settings.advanced.probe_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Arc::new(YtDlpBackend::new(self.tools(settings), timeout))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(DesktopPaths))
    }
}

pub fn run() -> std::process::ExitCode {
    use clap::Parser;

    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };

    let state = AppState::default();
    match runtime.block_on(cli::execute(cli, &state)) {
        Ok(true) => std::process::ExitCode::SUCCESS,
        Ok(false) => std::process::ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::ExitCode::FAILURE
        }
    }
}
