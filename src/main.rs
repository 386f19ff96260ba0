use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use adwatch_cli::{demo_script, AppConfig, SimScene, SimulatedPage, WatchRuntime};
use adwatch_event_bus::WatchBus;
use watch_protocol::{CoordinatorNotice, UiRequest, UiResponse};

#[derive(Parser)]
#[command(
    name = "adwatch",
    version,
    about = "Real-time ad/video playback observation pipeline"
)]
struct Cli {
    /// Path to a JSON config file; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the observer/coordinator pipeline against a scripted page
    Run {
        /// JSON scene script; the built-in demo timeline when omitted
        #[arg(long)]
        script: Option<PathBuf>,

        /// Stop after this many seconds (runs until Ctrl-C when omitted)
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Classify an ad's temporal position within its host video
    Classify {
        /// Elapsed host-video time, seconds
        #[arg(long)]
        time: f64,

        /// Host-video duration, seconds (0 for unknown)
        #[arg(long)]
        duration: f64,

        /// Whether playback has reached the end
        #[arg(long)]
        ended: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            script,
            duration_secs,
        } => run_pipeline(config, script, duration_secs).await,
        Command::Classify {
            time,
            duration,
            ended,
        } => {
            let position = ad_detector::classify(time, duration, ended, &config.tuning);
            println!("{}", position.name());
            Ok(())
        }
    }
}

async fn run_pipeline(
    config: AppConfig,
    script: Option<PathBuf>,
    duration_secs: Option<u64>,
) -> Result<()> {
    let scenes: Vec<SimScene> = match script {
        Some(path) => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading script {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing script {}", path.display()))?
        }
        None => demo_script(),
    };

    let page = Arc::new(SimulatedPage::new(scenes));
    let runtime = WatchRuntime::start(page, &config);

    let mut notices = runtime.notices.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(item) = notices.recv().await {
            match item.message {
                CoordinatorNotice::AdCountUpdated { count } => {
                    println!("ads seen (24h): {count}");
                }
                CoordinatorNotice::VideoCountUpdated { count } => {
                    println!("videos seen (24h): {count}");
                }
            }
        }
    });

    match duration_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
        }
    }

    for (label, request) in [
        ("ads", UiRequest::GetAds24h),
        ("videos", UiRequest::GetVideos24h),
    ] {
        if let UiResponse::Count { count } = runtime.coordinator.handle_request(None, request).await
        {
            println!("final {label} (24h): {count}");
        }
    }

    runtime.shutdown().await;
    printer.abort();
    Ok(())
}
