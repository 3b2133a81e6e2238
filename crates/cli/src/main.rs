//! `sfx-mix`: inspect, render and play sound-effect timeline projects.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sfx_core::{Config, CpalSink, Session, TransportState, write_wav};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sfx-mix")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a project from audio files, one track per file
    New {
        /// Project file to write
        project: PathBuf,

        /// Audio files to place on the timeline
        #[arg(required = true)]
        clips: Vec<PathBuf>,

        /// Seconds between the starts of consecutive tracks
        #[arg(long, default_value_t = 0.0)]
        stagger: f64,
    },

    /// List tracks and the total duration
    Info { project: PathBuf },

    /// Mix the timeline down to a 16-bit WAV file
    Render {
        project: PathBuf,

        /// Output file; defaults to a timestamped file in the export directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        sample_rate: Option<u32>,

        #[arg(long)]
        channels: Option<u16>,
    },

    /// Play the timeline through the default output device
    Play { project: PathBuf },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::New {
            project,
            clips,
            stagger,
        } => new_project(&project, &clips, stagger, config),
        Commands::Info { project } => info(&project, config),
        Commands::Render {
            project,
            output,
            sample_rate,
            channels,
        } => {
            let mut config = config;
            if let Some(sample_rate) = sample_rate {
                config.render.sample_rate = sample_rate;
            }
            if let Some(channels) = channels {
                config.render.channels = channels;
            }
            render(&project, output.as_deref(), config)
        }
        Commands::Play { project } => play(&project, config),
    }
}

fn open(project: &Path, config: Config) -> anyhow::Result<Session> {
    let session = Session::from_project(project, config)?;
    for offline in session.offline_clips() {
        warn!(clip = %offline.clip_id, error = %offline.error, "clip will play as silence");
    }
    Ok(session)
}

fn new_project(project: &Path, clips: &[PathBuf], stagger: f64, config: Config) -> anyhow::Result<()> {
    let mut session = Session::new(config);
    for (i, path) in clips.iter().enumerate() {
        let clip = session.import_clip(path)?;
        session.add_track_with(&clip, stagger * i as f64, 1.0)?;
    }
    session.save(project)?;

    info!(
        path = %project.display(),
        tracks = session.timeline().len(),
        duration = session.timeline().total_duration(),
        "created project"
    );
    Ok(())
}

fn info(project: &Path, config: Config) -> anyhow::Result<()> {
    let session = open(project, config)?;
    let timeline = session.timeline();

    println!("{}", session.name());
    for track in timeline.tracks() {
        let state = if session.clips().contains(track.clip_id()) {
            ""
        } else {
            " (offline)"
        };
        println!(
            "  {:<10} {:<24} start {:>7.2}s  len {:>7.2}s  gain {:.2}{}{}",
            track.id().as_str(),
            track.name(),
            track.start(),
            track.clip_duration(),
            track.gain(),
            if track.is_muted() { "  muted" } else { "" },
            state,
        );
    }
    println!("total {:.2}s over {} tracks", timeline.total_duration(), timeline.len());
    Ok(())
}

fn render(project: &Path, output: Option<&Path>, config: Config) -> anyhow::Result<()> {
    let session = open(project, config)?;

    let path = match output {
        Some(path) => {
            let buffer = session.render(None)?;
            write_wav(&buffer, path).with_context(|| format!("writing {}", path.display()))?;
            path.to_path_buf()
        }
        None => session.export(&session.export_dir(), None)?,
    };

    println!("{}", path.display());
    Ok(())
}

fn play(project: &Path, config: Config) -> anyhow::Result<()> {
    let session = open(project, config)?;
    let sink = CpalSink::default_output()?;
    let mut transport = session.play(&sink)?;

    let duration = transport.duration();
    let state = transport.wait(session.config().poll_interval(), |elapsed| {
        print!("\r{:>7.2}s / {:.2}s", elapsed.min(duration), duration);
        let _ = std::io::stdout().flush();
    });
    println!();

    if state != TransportState::Finished {
        warn!(?state, "playback ended early");
    }
    Ok(())
}
