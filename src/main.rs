//! musicai-editor CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use musicai_editor::commands::{mashup, session, upload};
use musicai_editor::jobs::materialize::track_id;
use musicai_editor::jobs::track_color;
use musicai_editor::services::path_service;
use musicai_editor::store::MashupSettingsUpdate;
use musicai_editor::{ApiError, ApiResult, AppContext, Settings};

/// musicai-editor - stem separation and mashups from the command line
#[derive(Parser, Debug)]
#[command(name = "musicai-editor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Backend base URL (overrides settings and MUSICAI_API_URL)
    #[arg(long, value_name = "URL", global = true)]
    api_url: Option<String>,

    /// Directory for settings and downloads
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file, separate it and list the resulting tracks
    Separate {
        file: PathBuf,

        /// Save every stem here once separation finishes
        #[arg(long, value_name = "DIR")]
        download: Option<PathBuf>,
    },

    /// Query a separation job once
    Status { job_id: String },

    /// Separate a file, then build a mashup from some of its stems
    Mashup {
        file: PathBuf,

        /// Stems to use, e.g. vocals,drums; vocal and instrument stems when omitted
        #[arg(long, value_delimiter = ',')]
        stems: Vec<String>,

        /// Where to save the finished mashup
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        #[arg(long, value_name = "BPM")]
        bpm: Option<u32>,

        /// Musical key or "auto"
        #[arg(long)]
        key: Option<String>,

        /// Crossfade in seconds (0-10)
        #[arg(long)]
        crossfade: Option<f64>,

        #[arg(long)]
        no_align: bool,

        #[arg(long)]
        harmonic: bool,

        #[arg(long)]
        energy: bool,
    },

    /// Download stems of an existing session
    Download {
        session_id: String,

        /// One stem; all stems as an archive when omitted
        #[arg(long)]
        stem: Option<String>,

        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Show session metadata
    Session { session_id: String },

    /// Delete a session and its files on the server
    Delete { session_id: String },

    /// Server load; refreshes until interrupted with --watch
    Stats {
        #[arg(long)]
        watch: bool,
    },

    /// Backend health check
    Health,

    /// Show or change the saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the settings file contents
    Show,

    /// Change one setting and save it
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    if let Command::Config { action } = &cli.command {
        return match run_config(&cli, action) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e.user_message());
                ExitCode::FAILURE
            }
        };
    }

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            return ExitCode::FAILURE;
        }
    };
    log::info!("Using backend at {}", settings.api_base_url);

    let ctx = match AppContext::new(settings) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            return ExitCode::FAILURE;
        }
    };

    match run(&ctx, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

fn settings_path(cli: &Cli) -> ApiResult<PathBuf> {
    let data_dir = match &cli.data_dir {
        Some(dir) => path_service::init_with(dir),
        None => path_service::init(),
    }
    .map_err(|e| ApiError::Settings(e.to_string()))?;
    log::debug!("Data directory: {}", data_dir.display());

    path_service::get_settings_path().map_err(|e| ApiError::Settings(e.to_string()))
}

fn load_settings(cli: &Cli) -> ApiResult<Settings> {
    let settings_path = settings_path(cli)?;
    let mut settings = Settings::load(&settings_path).with_env_overrides();
    if let Some(url) = &cli.api_url {
        settings.api_base_url = url.clone();
    }
    Ok(settings)
}

/// Reads and writes the file as stored; environment and flag overrides
/// are not saved.
fn run_config(cli: &Cli, action: &ConfigAction) -> ApiResult<()> {
    let path = settings_path(cli)?;
    let mut settings = Settings::load(&path);
    match action {
        ConfigAction::Show => {
            println!("# {}", path.display());
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        ConfigAction::Set { key, value } => {
            settings.set(key, value)?;
            settings.save(&path)?;
            log::info!("Saved {} to {}", key, path.display());
            println!("{} = {}", key, value.trim());
        }
    }
    Ok(())
}

fn default_downloads() -> ApiResult<PathBuf> {
    path_service::get_downloads_dir().map_err(|e| ApiError::Settings(e.to_string()))
}

fn print_progress(percent: u8) {
    eprint!("\rUploading... {:>3}%", percent);
    if percent >= 100 {
        eprintln!();
    }
}

async fn run(ctx: &AppContext, command: Command) -> ApiResult<()> {
    match command {
        Command::Separate { file, download } => {
            let job = upload::separate_file(ctx, &file, print_progress).await?;
            println!("Job {} {}", job.id, job.status);
            if let Some(analysis) = &job.analysis {
                println!(
                    "  tempo {:.1} BPM, key {}, energy {:.2}, danceability {:.2}",
                    analysis.tempo, analysis.key, analysis.energy, analysis.danceability
                );
            }
            for (index, track) in job.tracks.iter().enumerate() {
                println!(
                    "  {:<24} {:>7.2}s  {}  {}",
                    track.id,
                    track.duration,
                    track_color(index),
                    track.url
                );
            }
            if let Some(dir) = download {
                let path = session::download_all_stems(ctx, &dir).await?;
                println!("Saved {}", path.display());
            }
        }

        Command::Status { job_id } => {
            let status = ctx.client.get_job_status(&job_id).await?;
            println!("{} {} {:.0}%", status.job_id, status.status, status.progress);
            if let Some(message) = status.message.or(status.error) {
                println!("  {}", message);
            }
        }

        Command::Mashup {
            file,
            stems,
            out,
            bpm,
            key,
            crossfade,
            no_align,
            harmonic,
            energy,
        } => {
            let job = upload::separate_file(ctx, &file, print_progress).await?;
            ctx.update_store(|s| -> ApiResult<()> {
                s.set_mashup_settings(&MashupSettingsUpdate {
                    target_bpm: bpm,
                    target_key: key,
                    crossfade_duration: crossfade,
                    auto_align: Some(!no_align),
                    harmonic_mixing: Some(harmonic),
                    energy_matching: Some(energy),
                });
                for stem in &stems {
                    s.toggle_mashup_track(&track_id(&job.id, stem))?;
                }
                if s.auto_select_mashup_tracks() > 0 {
                    log::info!("Using stems {:?}", s.mashup_settings().selected_tracks);
                }
                Ok(())
            })?;

            let mashup_job = mashup::create_mashup_and_wait(ctx).await?;
            println!("Mashup {} {}", mashup_job.id, mashup_job.status);
            if let Some(url) = &mashup_job.result_url {
                println!("  {}", url);
            }
            let dir = match out {
                Some(dir) => dir,
                None => default_downloads()?,
            };
            let path = mashup::download_result(ctx, &dir).await?;
            println!("Saved {}", path.display());
        }

        Command::Download {
            session_id,
            stem,
            out,
        } => {
            let dir = match out {
                Some(dir) => dir,
                None => default_downloads()?,
            };
            ctx.update_store(|s| s.set_current_session(Some(session_id)));
            let path = match stem {
                Some(stem) => session::download_stem(ctx, &stem, &dir).await?,
                None => session::download_all_stems(ctx, &dir).await?,
            };
            println!("Saved {}", path.display());
        }

        Command::Session { session_id } => {
            let info = session::load_session(ctx, &session_id).await?;
            let json = serde_json::to_string_pretty(&info)?;
            println!("{}", json);
        }

        Command::Delete { session_id } => {
            session::delete_session(ctx, &session_id).await?;
            println!("Deleted {}", session_id);
        }

        Command::Stats { watch } => {
            if watch {
                watch_stats(ctx).await?;
            } else {
                let stats = ctx.client.get_server_stats().await?;
                print_stats(&stats);
            }
        }

        Command::Health => {
            let health = session::check_health(ctx).await?;
            println!("{}", health.status);
        }

        Command::Config { .. } => {
            return Err(ApiError::Settings("config is handled before connecting".to_string()));
        }
    }
    Ok(())
}

fn print_stats(stats: &musicai_editor::engine::types::ServerStats) {
    println!(
        "cpu {:.0}%  mem {:.0}%  gpu {}  disk {:.0}%  jobs {}  queue {}  up {}",
        stats.cpu_usage,
        stats.memory_usage,
        stats
            .gpu_usage
            .map(|g| format!("{:.0}%", g))
            .unwrap_or_else(|| "n/a".to_string()),
        stats.disk_usage,
        stats.active_jobs,
        stats.queue_length,
        session::format_uptime(stats.uptime)
    );
}

async fn watch_stats(ctx: &AppContext) -> ApiResult<()> {
    let mut watcher = session::StatsWatcher::spawn(ctx);
    loop {
        tokio::select! {
            snapshot = watcher.changed() => {
                let snapshot = snapshot?;
                match (&snapshot.stats, &snapshot.error) {
                    (_, Some(error)) => eprintln!("{}", error),
                    (Some(stats), None) => print_stats(stats),
                    (None, None) => {}
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    watcher.stop().await;
    Ok(())
}
