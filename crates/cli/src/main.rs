//! Serverless Fault Detector CLI
//!
//! A command-line tool for reading the detector's result log and for
//! inspecting models and feature vectors.

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{log, model};
use detector_lib::Provider;

/// Serverless Fault Detector CLI
#[derive(Parser)]
#[command(name = "sfd")]
#[command(author, version, about = "CLI for the Serverless Fault Detector", long_about = None)]
pub struct Cli {
    /// Result log written by the detector (can also be set via SFD_LOG_FILE env var)
    #[arg(long, env = "SFD_LOG_FILE", default_value = "results_log.txt")]
    pub log_file: PathBuf,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read the result log
    #[command(subcommand)]
    Log(LogCommands),

    /// Show the feature vector for a metrics sample
    Normalize {
        /// Metrics sample as a JSON object, `-` for stdin
        #[arg(long)]
        metrics: String,

        /// Provider the sample came from (AWS, Azure, GCP)
        #[arg(long, default_value = "AWS")]
        provider: Provider,
    },

    /// Score a metrics sample without logging or alerting
    Score {
        #[command(flatten)]
        model: model::ModelArgs,

        /// Metrics sample as a JSON object, `-` for stdin
        #[arg(long)]
        metrics: String,

        /// Provider the sample came from (AWS, Azure, GCP)
        #[arg(long, default_value = "AWS")]
        provider: Provider,
    },

    /// Model artifact commands
    #[command(subcommand)]
    Model(ModelCommands),
}

#[derive(Subcommand)]
pub enum LogCommands {
    /// Show logged results
    Show {
        /// Only show fault verdicts
        #[arg(long)]
        faults_only: bool,

        /// Show at most this many of the most recent results
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show the most recent result
    Latest,

    /// Show verdict counts and fault rate
    Summary,
}

#[derive(Subcommand)]
pub enum ModelCommands {
    /// Load a model artifact and describe it
    Info {
        #[command(flatten)]
        model: model::ModelArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Log(log_cmd) => match log_cmd {
            LogCommands::Show { faults_only, limit } => {
                log::show_log(&cli.log_file, faults_only, limit, cli.format)?;
            }
            LogCommands::Latest => {
                log::show_latest(&cli.log_file, cli.format)?;
            }
            LogCommands::Summary => {
                log::show_summary(&cli.log_file, cli.format)?;
            }
        },
        Commands::Normalize { metrics, provider } => {
            model::show_features(&metrics, provider, cli.format)?;
        }
        Commands::Score {
            model: args,
            metrics,
            provider,
        } => {
            model::score_sample(&args, &metrics, provider, cli.format)?;
        }
        Commands::Model(model_cmd) => match model_cmd {
            ModelCommands::Info { model: args } => {
                model::show_model_info(&args, cli.format)?;
            }
        },
    }

    Ok(())
}
