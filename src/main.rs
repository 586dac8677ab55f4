use anyhow::Result;
use clap::Parser;
use reelscribe::cli::{
    handle_process_command, handle_purge_command, handle_reanalyze_command, handle_reset_command,
    handle_status_command, Cli, CliCommand,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        CliCommand::Process(args) => handle_process_command(args).await,
        CliCommand::Status(args) => handle_status_command(args),
        CliCommand::Reset(args) => handle_reset_command(args),
        CliCommand::Reanalyze(args) => handle_reanalyze_command(args),
        CliCommand::Purge(args) => handle_purge_command(args).await,
        CliCommand::Version => {
            println!("reelscribe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
