use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use instruction_kiosk::config::AppConfig;
use instruction_kiosk::playback::{
    spawn_playback, PlaybackHandle, PlaybackNotification, TokioScheduler, WavFilePlayer,
};
use instruction_kiosk::resources::{
    FsStorage, Icon, Instruction, InstructionStore, ParsedResourceSet, UnparsableResource,
};
use instruction_kiosk::timing::compute_timing_plan;
use serde::Serialize;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(
    name = "kiosk_cli",
    about = "Inspect instruction resources and run playback sessions from the desktop"
)]
struct Cli {
    /// JSON config overriding the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover resources under a storage root
    Scan {
        root: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the timing plan for a cue offset and audio duration
    Plan {
        #[arg(long, allow_hyphen_values = true)]
        cue: i64,
        #[arg(long)]
        duration: u64,
    },
    /// Play one instruction with the WAV player and print its events
    Play {
        root: PathBuf,
        subject: String,
        language: String,
    },
}

#[derive(Serialize)]
struct ScanReport<'a> {
    instructions: Vec<&'a Instruction>,
    icons: Vec<&'a Icon>,
    failures: &'a [UnparsableResource],
}

fn main() -> ExitCode {
    instruction_kiosk::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .map(AppConfig::load_from_file)
        .unwrap_or_default();

    match cli.command {
        Commands::Scan { root, json } => run_scan(&config, root, json),
        Commands::Plan { cue, duration } => run_plan(&config, cue, duration),
        Commands::Play {
            root,
            subject,
            language,
        } => run_play(&config, root, &subject, &language),
    }
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
}

fn discover(runtime: &Runtime, config: &AppConfig, root: PathBuf) -> Result<Arc<ParsedResourceSet>> {
    let store = InstructionStore::new(Arc::new(FsStorage::new(root)), config);
    runtime
        .block_on(store.get_resources())
        .context("resource discovery failed")
}

fn run_scan(config: &AppConfig, root: PathBuf, json: bool) -> Result<ExitCode> {
    let runtime = runtime()?;
    let resources = discover(&runtime, config, root)?;

    if json {
        let report = ScanReport {
            instructions: resources.instructions().collect(),
            icons: resources.icons().collect(),
            failures: resources.failures(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Instructions:");
    for instruction in resources.instructions() {
        println!(
            "  {:<16} {:<12} cue {:>6}ms  {}",
            instruction.subject,
            instruction.language,
            instruction.cue_start_offset_ms,
            instruction.audio_location
        );
    }
    println!("Icons:");
    for icon in resources.icons() {
        println!("  {:<16} {}", icon.subject, icon.image_location);
    }
    if !resources.failures().is_empty() {
        println!("Unusable entries:");
        for failure in resources.failures() {
            println!("  {:<32} {:?}", failure.original_name, failure.failure);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_plan(config: &AppConfig, cue: i64, duration: u64) -> Result<ExitCode> {
    let plan = compute_timing_plan(
        cue,
        duration,
        config.playback.ideal_countdown_ms,
        config.playback.ideal_cue_ms,
    );
    println!("{}", serde_json::to_string_pretty(&plan)?);
    for (at_ms, remaining) in plan.countdown_ticks() {
        println!("  {:>6}ms  countdown {}", at_ms, remaining);
    }
    println!("  {:>6}ms  cue shown", plan.cue_start_ms);
    println!("  {:>6}ms  cue cleared", plan.cue_stop_ms);
    Ok(ExitCode::SUCCESS)
}

fn run_play(config: &AppConfig, root: PathBuf, subject: &str, language: &str) -> Result<ExitCode> {
    let runtime = runtime()?;
    let resources = discover(&runtime, config, root)?;
    let instruction = resources
        .instruction(subject, language)
        .cloned()
        .ok_or_else(|| anyhow!("no instruction for {}/{}", subject, language))?;

    let handle = runtime.handle().clone();
    let (playback, _driver) = spawn_playback(
        &handle,
        Arc::new(WavFilePlayer::new(handle.clone())),
        Arc::new(TokioScheduler::new(handle.clone())),
        config.playback.clone(),
    );

    runtime.block_on(watch_session(playback, instruction))
}

async fn watch_session(playback: PlaybackHandle, instruction: Instruction) -> Result<ExitCode> {
    let mut notifications = playback.subscribe();
    playback.select(instruction).await?;
    // No graphics to lay out on the desktop.
    playback.graphics_prepared()?;

    loop {
        let notification = notifications.recv().await?;
        println!("{}", serde_json::to_string(&notification)?);
        match notification {
            PlaybackNotification::Finished { .. } => return Ok(ExitCode::SUCCESS),
            PlaybackNotification::Aborted { error, .. } => {
                if let Some(error) = error {
                    eprintln!("Playback aborted: {}", error);
                }
                return Ok(ExitCode::from(2));
            }
            _ => {}
        }
    }
}
