use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tapedeck::{
    list_input_devices, AudioFile, BitDepth, CaptureSource, HostBackend, Pace, Recorder, ReplaySource, SessionEvent,
    Settings, TrackMetadata,
};
use tracing::{error, info, warn};

/// Record audio input straight to tagged MP3 files.
#[derive(Parser)]
#[command(name = "tapedeck", about = "Record audio input to tagged MP3 files", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (defaults to ./tapedeck.toml if present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio input devices.
    Devices,

    /// Record until Ctrl-C or the given duration, then save.
    Record(RecordArgs),
}

#[derive(Args)]
struct RecordArgs {
    /// Input device index (see `tapedeck devices`).
    #[arg(short, long)]
    device: Option<usize>,

    /// Replay a WAV file instead of capturing from a device.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Title, also used as the file name.
    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    genre: Option<String>,

    #[arg(long)]
    singer: Option<String>,

    #[arg(long)]
    album: Option<String>,

    /// Stop after this many seconds.
    #[arg(long)]
    seconds: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "tapedeck=debug" } else { "tapedeck=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Commands::Devices => devices(),
        Commands::Record(args) => record(cli.config.as_deref(), args).await,
    }
}

fn devices() -> Result<()> {
    let devices = list_input_devices().context("Failed to enumerate input devices")?;
    if devices.is_empty() {
        println!("No input devices found");
    }
    for device in devices {
        println!("{:>3}  {}", device.index, device.name);
    }
    Ok(())
}

async fn record(config: Option<&str>, args: RecordArgs) -> Result<()> {
    let mut settings = Settings::load(config).context("Failed to load settings")?;

    let source = match &args.replay {
        Some(path) => {
            let audio = AudioFile::open(path).with_context(|| format!("Failed to read {}", path.display()))?;
            settings.sample_rate_hz = audio.sample_rate;
            settings.channels = audio.channels;
            settings.bit_depth = BitDepth::Sixteen.into();
            CaptureSource::Replay {
                source: ReplaySource::from_file(&audio),
                pace: Pace::RealTime,
            }
        }
        None => CaptureSource::Device,
    };

    let metadata = TrackMetadata {
        title: args.title.unwrap_or_default(),
        genre: args.genre.unwrap_or_default(),
        singer: args.singer.unwrap_or_default(),
        album: args.album.unwrap_or_default(),
    };

    let auto_start = settings.auto_start_recording;
    let mut recorder =
        Recorder::spawn(settings, Arc::new(HostBackend::new(source))).context("Failed to start recorder")?;
    let handle = recorder.handle();
    let levels = recorder.levels();

    handle.set_metadata(metadata)?;
    if !auto_start {
        match args.device {
            Some(device) => handle.start_on(device)?,
            None => handle.start()?,
        }
    } else if let Some(device) = args.device {
        handle.switch_device(device)?;
    }

    let timer = async {
        match args.seconds {
            Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(timer);
    let mut timer_done = false;
    let mut meter = tokio::time::interval(Duration::from_secs(1));

    info!("Recording, press Ctrl-C to stop and save");
    loop {
        tokio::select! {
            event = recorder.next_event() => match event {
                Some(SessionEvent::ShutdownRequested) | None => break,
                Some(SessionEvent::Started { path, device_index }) => {
                    info!("Device {} recording to {}", device_index, path.display());
                }
                Some(SessionEvent::Finalized(recording)) => {
                    info!(
                        "Saved {} ({:.1}s{})",
                        recording.path.display(),
                        recording.duration.as_secs_f64(),
                        if recording.tagged { "" } else { ", untagged" }
                    );
                    // Already shutting down if close_after_save is set.
                    handle.close().ok();
                }
                Some(SessionEvent::Failed(e)) => {
                    error!("{}", e);
                    handle.close().ok();
                }
                Some(SessionEvent::Warning(w)) => warn!("{}", w),
                Some(SessionEvent::StateChanged(_)) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, saving recording");
                handle.close().ok();
            }
            _ = &mut timer, if !timer_done => {
                timer_done = true;
                handle.stop().ok();
            }
            _ = meter.tick() => {
                let reading = *levels.borrow();
                info!(
                    "{:>6.1}s  L {:>3.0}%  R {:>3.0}%",
                    reading.elapsed.as_secs_f64(),
                    reading.level.left_percent(),
                    reading.level.right_percent()
                );
            }
        }
    }

    recorder.join().await.context("Recorder task failed")?;
    Ok(())
}
