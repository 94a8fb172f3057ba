use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use waveget_core::models::media::OutputKind;

use crate::commands::{analysis, dependencies, downloads, probe, settings};
use crate::core::events::ConsoleEventEmitter;
use crate::AppState;

#[derive(Debug, Parser)]
#[command(name = "waveget", version, about = "Download media, convert it, and detect tempo and key")]
pub struct Cli {
    /// Print events as JSON lines
    #[arg(long, global = true, env = "WAVEGET_JSON")]
    pub json: bool,

    /// More log output on stderr (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download a URL and convert it
    Download {
        url: String,
        /// Output directory (defaults to the configured one)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// audio-lossless (wav), audio-lossy (mp3) or video (mp4)
        #[arg(short, long)]
        format: Option<OutputKind>,
        /// Bitrate for mp3 (e.g. 192k) or height for video (e.g. 720p)
        #[arg(short, long)]
        quality: Option<String>,
        /// Skip tempo/key detection after audio downloads
        #[arg(long)]
        no_analyze: bool,
        /// Open the output directory once the download succeeds
        #[arg(long)]
        open: bool,
    },
    /// Show title, duration, uploader and views without downloading
    Probe { url: String },
    /// Detect tempo and key of a local audio file
    Analyze { path: PathBuf },
    /// Report yt-dlp and ffmpeg versions
    Deps,
    /// Inspect or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    Show,
    /// Merge a JSON object into the settings
    Set { patch: String },
    Reset,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Runs one subcommand to completion. `Ok(false)` means the work itself
/// failed and was already reported.
pub async fn execute(cli: Cli, state: &AppState) -> anyhow::Result<bool> {
    let emitter = ConsoleEventEmitter::new(cli.json);

    match cli.command {
        Command::Download {
            url,
            output,
            format,
            quality,
            no_analyze,
            open,
        } => {
            let args = downloads::DownloadArgs {
                url,
                output_dir: output,
                kind: format,
                quality,
                auto_analyze: no_analyze.then_some(false),
                open_folder: open.then_some(true),
            };
            let task = downloads::download_from_url(state, emitter.clone(), args)
                .await
                .map_err(|e| anyhow!(e))?;
            let id = task.started.id;
            let mut handle = task.handle;

            let outcome = tokio::select! {
                res = &mut handle => res?,
                _ = tokio::signal::ctrl_c() => {
                    let _ = downloads::cancel_download(state, id).await;
                    handle.await?
                }
            };
            state.session.analysis.join().await;
            Ok(outcome.is_success() && !emitter.had_failure())
        }
        Command::Probe { url } => {
            probe::probe_media(state, emitter.clone(), url)
                .await
                .map_err(|e| anyhow!(e))?;
            state.session.probe.join().await;
            Ok(!emitter.had_failure())
        }
        Command::Analyze { path } => {
            analysis::analyze_file(state, emitter.clone(), path)
                .await
                .map_err(|e| anyhow!(e))?;
            state.session.analysis.join().await;
            Ok(!emitter.had_failure())
        }
        Command::Deps => {
            let deps = dependencies::check_dependencies(state)
                .await
                .map_err(|e| anyhow!(e))?;
            if cli.json {
                print_json(&deps)?;
            } else {
                for d in &deps {
                    match &d.version {
                        Some(v) => println!("{}: {}", d.name, v),
                        None => println!("{}: not found", d.name),
                    }
                }
            }
            Ok(deps.iter().all(|d| d.installed))
        }
        Command::Settings { action } => {
            let current = match action {
                SettingsAction::Show => settings::get_settings(state),
                SettingsAction::Set { patch } => settings::update_settings(state, &patch),
                SettingsAction::Reset => settings::reset_settings(state),
            }
            .map_err(|e| anyhow!(e))?;
            print_json(&current)?;
            Ok(true)
        }
    }
}
