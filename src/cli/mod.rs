use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

mod process;
mod purge;
mod session;

pub use process::handle_process_command;
pub use purge::handle_purge_command;
pub use session::{handle_reanalyze_command, handle_reset_command, handle_status_command};

#[derive(Parser, Debug)]
#[command(name = "reelscribe")]
#[command(about = "Movie-night recording pipeline", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Process a session folder through the pipeline
    Process(ProcessCliArgs),
    /// Show per-file pipeline state for a session
    Status(StatusCliArgs),
    /// Reset a file back to an earlier pipeline state
    Reset(ResetCliArgs),
    /// Re-parse the cached AI analysis response without calling the provider
    Reanalyze(ReanalyzeCliArgs),
    /// Delete every stored transcription from the provider account
    Purge(PurgeCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct ProcessCliArgs {
    /// Session folder containing the raw recordings
    pub folder: PathBuf,
    /// Session title (defaults to the folder name)
    #[arg(short, long)]
    pub title: Option<String>,
    /// Session date, YYYY-MM-DD (defaults to today)
    #[arg(short, long)]
    pub date: Option<String>,
    /// Mic assignment, repeatable: e.g. --mic 1=Alice --mic 2=Bob
    #[arg(short, long = "mic")]
    pub mics: Vec<String>,
    /// Stage to start from: convert, upload, transcribe, analyze
    #[arg(long, default_value = "convert")]
    pub from: String,
    /// Start even if the session document says a run is mid-flight
    #[arg(long)]
    pub force: bool,
}

#[derive(ClapArgs, Debug)]
pub struct StatusCliArgs {
    /// Session folder
    pub folder: PathBuf,
}

#[derive(ClapArgs, Debug)]
pub struct ResetCliArgs {
    /// Session folder
    pub folder: PathBuf,
    /// File name within the session to reset
    #[arg(short, long)]
    pub file: String,
    /// Target state, e.g. pending, processed_mp3, transcription_complete
    #[arg(short, long)]
    pub to: String,
}

#[derive(ClapArgs, Debug)]
pub struct ReanalyzeCliArgs {
    /// Session folder
    pub folder: PathBuf,
}

#[derive(ClapArgs, Debug)]
pub struct PurgeCliArgs {
    /// Listing page size
    #[arg(long)]
    pub page_size: Option<usize>,
}
