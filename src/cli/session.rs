//! `status`, `reset` and `reanalyze` commands.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::analysis::AnalysisOutcome;
use crate::config::Config;
use crate::pipeline::state::{self, ProcessingStatus};
use crate::pipeline::{aggregate_progress, reanalyze_from_cached};
use crate::session::{JsonSessionRepository, MovieSession, SessionRepository};

use super::{ReanalyzeCliArgs, ResetCliArgs, StatusCliArgs};

fn load_session(
    repository: &JsonSessionRepository,
    folder: &Path,
) -> Result<MovieSession> {
    let folder = folder
        .canonicalize()
        .with_context(|| format!("Session folder {folder:?} not found"))?;
    repository
        .find_by_folder(&folder)?
        .with_context(|| format!("No session recorded for {folder:?}; run 'process' first"))
}

pub fn handle_status_command(args: StatusCliArgs) -> Result<()> {
    let repository = JsonSessionRepository::new(Config::session_root()?);
    let session = load_session(&repository, &args.folder)?;

    println!(
        "Session '{}' ({}): {} at {}%",
        session.title,
        session.date,
        session.status.as_str(),
        aggregate_progress(&session)
    );
    if let Some(error) = &session.error_message {
        println!("  note: {error}");
    }
    for file in &session.audio_files {
        let speaker = session.speaker_name(file);
        let retry = if file.can_retry { " (retryable)" } else { "" };
        println!(
            "  {:<30} {:<24} {:>3}%  {}{}",
            file.file_name,
            file.status.as_str(),
            file.progress_percentage,
            if speaker == file.file_name {
                file.current_step.clone()
            } else {
                format!("{speaker}: {}", file.current_step)
            },
            retry
        );
    }
    Ok(())
}

pub fn handle_reset_command(args: ResetCliArgs) -> Result<()> {
    let repository = JsonSessionRepository::new(Config::session_root()?);
    let mut session = load_session(&repository, &args.folder)?;

    let target = ProcessingStatus::parse(&args.to)
        .with_context(|| format!("Unknown state '{}'", args.to))?;

    let file = session
        .audio_files
        .iter_mut()
        .find(|f| f.file_name == args.file)
        .with_context(|| format!("No file named '{}' in this session", args.file))?;

    state::reset_to_state(file, target)
        .with_context(|| format!("Cannot reset '{}' to {}", args.file, target.as_str()))?;

    let name = file.file_name.clone();
    repository.save(&session)?;
    println!("Reset {name} to {}", target.as_str());
    Ok(())
}

pub fn handle_reanalyze_command(args: ReanalyzeCliArgs) -> Result<()> {
    let repository = Arc::new(JsonSessionRepository::new(Config::session_root()?));
    let mut session = load_session(&repository, &args.folder)?;

    if session.raw_analysis_response.is_none() {
        bail!(
            "Session '{}' has no cached analysis response; run 'process --from analyze' instead",
            session.title
        );
    }

    match reanalyze_from_cached(&mut session)? {
        AnalysisOutcome::Parsed => {
            repository.save(&session)?;
            println!("Cached response parsed; session '{}' is complete.", session.title);
        }
        AnalysisOutcome::RawRetained => {
            println!(
                "Cached response still does not parse; raw text kept for a later attempt."
            );
        }
    }
    Ok(())
}
