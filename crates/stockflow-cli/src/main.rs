mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stockflow",
    version,
    about = "Checkpointed multi-step ticker analysis runs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new analysis run for a ticker symbol
    Run {
        /// Path to workflow YAML file
        workflow: PathBuf,
        /// Ticker symbol to analyze (e.g. "AAPL")
        subject: String,
        /// Submit the run and return its id without waiting for it
        #[arg(long)]
        detach: bool,
    },
    /// Resume an interrupted run from its latest checkpoint
    Resume {
        /// Path to workflow YAML file
        workflow: PathBuf,
        /// Run id to resume
        run_id: String,
    },
    /// Show the latest state of a run
    Show {
        /// Path to workflow YAML file
        workflow: PathBuf,
        /// Run id to show
        run_id: String,
        /// Also print the last N checkpoints, newest first
        #[arg(long, default_value_t = 0)]
        history: usize,
    },
    /// List known runs, most recently started first
    List {
        /// Path to workflow YAML file
        workflow: PathBuf,
        /// Maximum number of runs to list
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            workflow,
            subject,
            detach,
        } => commands::run::execute(&workflow, &subject, detach).await,
        Commands::Resume { workflow, run_id } => {
            commands::resume::execute(&workflow, &run_id).await
        }
        Commands::Show {
            workflow,
            run_id,
            history,
        } => commands::show::execute(&workflow, &run_id, history).await,
        Commands::List { workflow, limit } => commands::list::execute(&workflow, limit).await,
    }
}
