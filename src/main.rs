use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use email_cleaning::{
    specs::{ClassifierTrainRequest, EncoderTrainRequest, FromJson, SegmentRequest},
    EmailCleaner, Settings,
};

#[derive(Parser)]
#[command(name = "email-cleaning", version, about = "Segment email threads and train their models")]
struct Cli {
    /// Settings file, layered over `email_cleaning.toml` and under `EMAIL_CLEANING_*` variables.
    #[arg(long, global = true, env = "EMAIL_CLEANING_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the tracker's root directory.
    #[arg(long, global = true)]
    tracking_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Segments the threads of a request and prints them as JSON.
    Segment { request: PathBuf },
    /// Trains the classifier of a pipeline.
    TrainClassifier { request: PathBuf },
    /// Fine-tunes a sentence encoder.
    TrainEncoder { request: PathBuf },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut settings =
        Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(dir) = cli.tracking_dir {
        settings.tracking_dir = dir;
    }

    let mut cleaner = EmailCleaner::new(settings);

    match cli.command {
        Command::Segment { request } => {
            let request = SegmentRequest::from_path(&request)
                .with_context(|| format!("failed to read {}", request.display()))?;
            let dataset = cleaner.segment(&request.threads, &request.pipeline)?;
            println!("{}", serde_json::to_string_pretty(&dataset)?);
        }
        Command::TrainClassifier { request } => {
            let request = ClassifierTrainRequest::from_path(&request)
                .with_context(|| format!("failed to read {}", request.display()))?;
            let trained = cleaner.train_classifier(&request)?;
            info!("classifier run {} finished", trained.run.run_id);
        }
        Command::TrainEncoder { request } => {
            let request = EncoderTrainRequest::from_path(&request)
                .with_context(|| format!("failed to read {}", request.display()))?;
            let trained = cleaner.train_encoder(&request)?;
            info!("encoder run {} finished", trained.run.run_id);
        }
    }

    Ok(())
}
