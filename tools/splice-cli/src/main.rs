//! Splice CLI: export and resume media compositions.
//!
//! Usage:
//!   splice export <COMPOSITION> -o <OUT>                  Export a composition
//!   splice resume <COMPOSITION> -o <OUT> --previous <OLD> Finish an interrupted export
//!   splice probe <MEDIA>                                  Show keyframe and format info
//!   splice check                                          Check for ffmpeg tooling
//!   splice config                                         Show the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use splice_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "splice",
    about = "Trim-optimizing, resumable media export",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit structured JSON logs
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a composition to a single output file
    Export {
        /// Path to a composition JSON file
        composition: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Transcode only the span before the first keyframe of a trimmed clip
        #[arg(long)]
        trim_optimization: bool,

        /// Requested output video mime type (e.g. video/hevc)
        #[arg(long)]
        video_mime: Option<String>,

        /// Requested output audio mime type (e.g. audio/mp4a-latm)
        #[arg(long)]
        audio_mime: Option<String>,
    },

    /// Resume an export that was interrupted while writing PREVIOUS
    Resume {
        /// Path to the composition JSON file of the interrupted export
        composition: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Partial output left behind by the interrupted export
        #[arg(short, long)]
        previous: PathBuf,
    },

    /// Show the formats and keyframe layout of a media file
    Probe {
        /// Media file path
        media: PathBuf,

        /// Report the first keyframe at or after this position (seconds)
        #[arg(long, default_value = "0.0")]
        trim_start: f64,
    },

    /// Check that ffmpeg and ffprobe are available
    Check,

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    logging.json |= cli.json_logs;
    splice_common::logging::init_logging(&logging);
    tracing::debug!(config = %AppConfig::path().display(), "Configuration loaded");

    match cli.command {
        Commands::Export {
            composition,
            output,
            trim_optimization,
            video_mime,
            audio_mime,
        } => {
            commands::export::run(
                &config,
                composition,
                output,
                trim_optimization,
                video_mime,
                audio_mime,
            )
            .await
        }
        Commands::Resume {
            composition,
            output,
            previous,
        } => commands::resume::run(&config, composition, output, previous).await,
        Commands::Probe { media, trim_start } => {
            commands::probe::run(&config, media, trim_start).await
        }
        Commands::Check => commands::check::run(&config),
        Commands::Config { save } => commands::config::run(&config, save),
    }
}
