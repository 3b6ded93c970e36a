//! Guard Ranker - Main Entry Point

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use guard_ranker::api::commands;
use guard_ranker::config::Config;
use guard_ranker::constants::{APP_NAME, APP_VERSION, DEFAULT_EVAL_KS, DEFAULT_MRR_CUTOFF};
use guard_ranker::logic::service::PredictionRequest;

/// Top-K guard relay ranking
#[derive(Parser, Debug)]
#[command(name = "guard-ranker")]
#[command(about = "Train, evaluate and serve guard relay rankings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model and write an artifact bundle
    Train {
        /// Circuit corpus CSV
        #[arg(short, long)]
        corpus: PathBuf,

        /// Output bundle directory (defaults to the configured artifact dir)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Training config JSON
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Score a bundle on a labelled corpus
    Evaluate {
        #[arg(short, long)]
        corpus: PathBuf,

        #[arg(short, long)]
        artifact: Option<PathBuf>,

        /// K values for top-K accuracy
        #[arg(short, long, value_delimiter = ',')]
        ks: Vec<usize>,

        #[arg(long, default_value_t = DEFAULT_MRR_CUTOFF)]
        mrr_cutoff: usize,

        /// Hide the guard, as in serving
        #[arg(long)]
        serving_path: bool,
    },

    /// Rank guards for one circuit
    Predict {
        #[arg(long)]
        exit_fingerprint: String,

        #[arg(long, default_value = "")]
        exit_country: String,

        /// MB/s, 0 when unknown
        #[arg(long, default_value_t = 0.0)]
        bandwidth: f64,

        /// Seconds
        #[arg(long, default_value_t = 0.0)]
        setup_time: f64,

        #[arg(long)]
        middle_fingerprint: Option<String>,

        #[arg(long)]
        middle_country: Option<String>,

        #[arg(short, long, allow_negative_numbers = true)]
        k: Option<i64>,

        #[arg(long)]
        explain: bool,

        #[arg(short, long)]
        artifact: Option<PathBuf>,

        /// Relay metadata CSV
        #[arg(short, long)]
        metadata: Option<PathBuf>,
    },

    /// Show model info and engine status
    Info {
        #[arg(short, long)]
        artifact: Option<PathBuf>,
    },

    /// Write the engineered feature matrix as CSV
    ExportFeatures {
        #[arg(short, long)]
        corpus: PathBuf,

        #[arg(short, long)]
        artifact: Option<PathBuf>,

        /// Output CSV (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serializing output")?);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    log::debug!("{} v{}", APP_NAME, APP_VERSION);

    match cli.command {
        Command::Train { corpus, out, config: train_config } => {
            let out = out.unwrap_or(config.artifact_dir);
            let summary = commands::train(&corpus, &out, train_config.as_deref())?;
            print_json(&summary)?;
        }
        Command::Evaluate { corpus, artifact, ks, mrr_cutoff, serving_path } => {
            let artifact = artifact.unwrap_or(config.artifact_dir);
            let ks = if ks.is_empty() { DEFAULT_EVAL_KS.to_vec() } else { ks };
            let report = commands::evaluate(&artifact, &corpus, &ks, mrr_cutoff, serving_path)?;
            print_json(&report)?;
        }
        Command::Predict {
            exit_fingerprint,
            exit_country,
            bandwidth,
            setup_time,
            middle_fingerprint,
            middle_country,
            k,
            explain,
            artifact,
            metadata,
        } => {
            if let Some(artifact) = artifact {
                config.artifact_dir = artifact;
            }
            if metadata.is_some() {
                config.metadata_path = metadata;
            }
            let request = PredictionRequest {
                middle_fingerprint,
                middle_country,
                k,
                explain,
                ..PredictionRequest::new(&exit_fingerprint, &exit_country, bandwidth, setup_time)
            };
            print_json(&commands::predict(&config, &request)?)?;
        }
        Command::Info { artifact } => {
            if let Some(artifact) = artifact {
                config.artifact_dir = artifact;
            }
            print_json(&commands::info(&config)?)?;
        }
        Command::ExportFeatures { corpus, artifact, out } => {
            let artifact = artifact.unwrap_or(config.artifact_dir);
            let rows = commands::export_features(&artifact, &corpus, out.as_deref())?;
            log::info!("Wrote {} rows", rows);
        }
    }

    Ok(())
}
