//! MediaMerge CLI: compose cover images, a screen recording, and music
//! into one promotional video.
//!
//! Usage:
//!   mediamerge compose [OPTIONS]   Render a composition to a file
//!   mediamerge plan [OPTIONS]      Print the timeline for given durations
//!   mediamerge check               Check ffmpeg and encoder availability

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod history;

#[derive(Parser)]
#[command(
    name = "mediamerge",
    about = "Compose cover images, a screen recording, and music into one video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// How the total output length is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// At least `--minimum-secs`, longer if the content needs it
    Additive,
    /// Exactly `--target-secs`; the recording is sped up or slowed down
    Exact,
    /// One slot per cover image plus the recording at playback speed
    BannerCount,
}

/// Duration inputs shared by `compose` and `plan`.
#[derive(Debug, Clone, clap::Args)]
pub struct PolicyOptions {
    /// Duration policy
    #[arg(long, value_enum, default_value = "additive")]
    pub policy: PolicyArg,

    /// Floor for the additive policy (seconds)
    #[arg(long, default_value = "60")]
    pub minimum_secs: f64,

    /// Total length for the exact policy (seconds)
    #[arg(long)]
    pub target_secs: Option<f64>,

    /// Close with an end card carrying this title
    #[arg(long)]
    pub end_card: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a composition
    Compose {
        /// Cover image (repeat for up to 15)
        #[arg(long = "image")]
        images: Vec<PathBuf>,

        /// Screen recording
        #[arg(long)]
        video: PathBuf,

        /// Music track (repeat to build a pool; one is picked per run)
        #[arg(long = "audio")]
        audio: Vec<PathBuf>,

        /// JSON file with composition options
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        policy: PolicyOptions,

        /// Seed for track selection and glitch offsets
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Output file path (defaults to the configured output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Local command that answers title/description requests as JSON
        #[arg(long)]
        suggest_cmd: Option<String>,
    },

    /// Print the timeline for given durations without decoding media
    Plan {
        /// Number of cover images
        #[arg(long, default_value = "1")]
        banners: usize,

        /// Natural length of the screen recording (seconds)
        #[arg(long)]
        main_secs: f64,

        /// JSON file with composition options
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        policy: PolicyOptions,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check ffmpeg, ffprobe, and encoder availability
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let app_config = mediamerge_common::config::AppConfig::load();
    let mut logging = app_config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    mediamerge_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Compose {
            images,
            video,
            audio,
            config,
            policy,
            seed,
            output,
            suggest_cmd,
        } => {
            commands::compose::run(
                &app_config,
                commands::compose::ComposeArgs {
                    images,
                    video,
                    audio,
                    config,
                    policy,
                    seed,
                    output,
                    suggest_cmd,
                },
            )
            .await
        }
        Commands::Plan {
            banners,
            main_secs,
            config,
            policy,
            json,
        } => commands::plan::run(&app_config, banners, main_secs, config, policy, json),
        Commands::Check => commands::check::run(&app_config),
    }
}
