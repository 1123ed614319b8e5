use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use talk_compositor::{
    composition::{CompositorDriver, PipOverlay},
    config::Config,
    talk::{resolve_inputs, spawn_blocking_traced, TalkLogLayer, TalkPipeline},
};

#[derive(Parser)]
#[command(
    name = "talk-compositor",
    version,
    about = "Compose conference talk videos with their slides",
    long_about = "Talk-Compositor downloads a talk's video and slides and renders a composite video with the slides in sync and the speaker picture-in-picture."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Download and compose one talk URL, or every URL listed in a file
    Process {
        /// Talk URL or path to a newline-delimited URL list
        input: String,
    },

    /// Compose a local video with a directory of `<ms>.png` slides
    Compose {
        #[arg(long)]
        video: PathBuf,

        #[arg(long)]
        slides: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Render strategy (segment, frame)
        #[arg(short, long)]
        strategy: Option<String>,
    },

    /// Render a single composited frame to a PNG
    Preview {
        #[arg(long)]
        video: PathBuf,

        #[arg(long)]
        slides: PathBuf,

        /// Instant in seconds
        #[arg(long)]
        at: f64,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Overlay a secondary video onto a main video
    Pip {
        #[arg(long)]
        main: PathBuf,

        #[arg(long)]
        secondary: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(TalkLogLayer::new())
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Returns whether everything succeeded
async fn run(cli: Cli) -> Result<bool> {
    info!("Starting Talk-Compositor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    if let Command::Compose { strategy: Some(strategy), .. } = &cli.command {
        config.render.strategy = strategy.clone();
    }
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Command::Process { input } => {
            let urls = resolve_inputs(&input).await?;
            let pipeline = TalkPipeline::new(config);

            if urls.len() == 1 {
                let outcome = pipeline.process(&urls[0]).await;
                if let Err(failure) = &outcome.result {
                    error!("Talk failed at {}: {}", failure.stage, failure.message);
                }
                Ok(outcome.is_success())
            } else {
                let summary = pipeline.process_batch(urls).await;
                summary.log();
                Ok(summary.all_succeeded())
            }
        }

        Command::Compose { video, slides, output, .. } => {
            let mut driver = CompositorDriver::new(config);
            let rendered = driver.compose(video, slides, output).await?;
            info!(
                "Composition complete! Output saved to: {:?} ({:.1}s, {} strategy)",
                rendered.path, rendered.duration, rendered.strategy
            );
            Ok(true)
        }

        Command::Preview { video, slides, at, output } => {
            let mut driver = CompositorDriver::new(config);
            driver.preview(video, slides, at, output).await?;
            Ok(true)
        }

        Command::Pip { main, secondary, output } => {
            let encoder = config.encoder.clone();
            spawn_blocking_traced(move || PipOverlay::default().run(&main, &secondary, &output, &encoder))
                .await??;
            Ok(true)
        }
    }
}
