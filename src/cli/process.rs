//! `process` command: run the pipeline for a session folder.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::analysis::OpenAiCompletionProvider;
use crate::classifier::FileClassifier;
use crate::config::Config;
use crate::converter::FfmpegConverter;
use crate::pipeline::{aggregate_progress, Orchestrator, PipelineStage, ProgressCallback};
use crate::session::{JsonSessionRepository, MovieSession, SessionRepository, SessionStatus};
use crate::transcription::GladiaClient;

use super::ProcessCliArgs;

pub async fn handle_process_command(args: ProcessCliArgs) -> Result<()> {
    let config = Config::load()?;
    let folder = args
        .folder
        .canonicalize()
        .with_context(|| format!("Session folder {:?} not found", args.folder))?;

    let start = PipelineStage::parse(&args.from)
        .with_context(|| format!("Unknown stage '{}'; expected convert, upload, transcribe or analyze", args.from))?;

    let repository = Arc::new(JsonSessionRepository::new(Config::session_root()?));

    let mut session = match repository.find_by_folder(&folder)? {
        Some(existing) => {
            info!("Resuming session '{}' ({})", existing.title, existing.id);
            existing
        }
        None => {
            let title = args.title.clone().unwrap_or_else(|| {
                folder
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "Untitled session".to_string())
            });
            let date = match &args.date {
                Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
                    .context("Date must be YYYY-MM-DD")?,
                None => chrono::Local::now().date_naive(),
            };
            MovieSession::new(title, date, folder.clone())
        }
    };

    if session.status.is_in_progress() && !args.force {
        bail!(
            "Session '{}' appears to be mid-flight (status: {}). \
             Re-run with --force if no other run is active.",
            session.title,
            session.status.as_str()
        );
    }

    if !args.mics.is_empty() {
        session.mic_assignments = parse_mic_assignments(&args.mics)?;
    }

    if session.audio_files.is_empty() {
        let classifier = FileClassifier::new();
        session.audio_files = classifier.classify_folder(&folder, &session.mic_assignments)?;
        if session.audio_files.is_empty() {
            bail!("No media files found in {:?}", folder);
        }
        repository.save(&session)?;
    }

    let orchestrator = Orchestrator::new(
        Arc::new(FfmpegConverter::new(config.converter.bitrate_kbps)?),
        Arc::new(GladiaClient::new(&config.gladia)),
        Arc::new(OpenAiCompletionProvider::new(&config.analysis)),
        repository.clone(),
    );

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let progress: ProgressCallback = {
        let bar = bar.clone();
        Arc::new(move |message: &str, percent: u8| {
            bar.set_position(percent as u64);
            bar.set_message(message.to_string());
        })
    };

    let outcome = orchestrator
        .process_from_stage(&mut session, start, &progress)
        .await;
    repository.save(&session)?;
    bar.finish_and_clear();
    outcome?;

    print_summary(&session);
    Ok(())
}

fn parse_mic_assignments(specs: &[String]) -> Result<BTreeMap<u32, String>> {
    let mut assignments = BTreeMap::new();
    for spec in specs {
        let (index, name) = spec
            .split_once('=')
            .with_context(|| format!("Mic assignment '{spec}' must look like 1=Alice"))?;
        let one_based: u32 = index
            .trim()
            .parse()
            .with_context(|| format!("Mic index in '{spec}' must be a number"))?;
        if one_based == 0 {
            bail!("Mic indexes are one-based; '{spec}' uses 0");
        }
        assignments.insert(one_based - 1, name.trim().to_string());
    }
    Ok(assignments)
}

fn print_summary(session: &MovieSession) {
    println!(
        "\nSession '{}' ({}): {} at {}%",
        session.title,
        session.date,
        session.status.as_str(),
        aggregate_progress(session)
    );
    if let Some(error) = &session.error_message {
        println!("  note: {error}");
    }
    for file in &session.audio_files {
        println!(
            "  {:<30} {:<24} {}",
            file.file_name,
            file.status.as_str(),
            file.current_step
        );
    }
    if session.status == SessionStatus::Complete {
        if let Some(results) = &session.category_results {
            println!("\nAwards:");
            for (category, winner) in &results.categories {
                println!(
                    "  {category}: {} \"{}\" ({}/10)",
                    winner.speaker, winner.quote, winner.entertainment_score
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mic_assignments() {
        let parsed =
            parse_mic_assignments(&["1=Alice".to_string(), "2= Bob ".to_string()]).unwrap();
        assert_eq!(parsed.get(&0), Some(&"Alice".to_string()));
        assert_eq!(parsed.get(&1), Some(&"Bob".to_string()));
    }

    #[test]
    fn test_parse_mic_assignments_rejects_bad_specs() {
        assert!(parse_mic_assignments(&["Alice".to_string()]).is_err());
        assert!(parse_mic_assignments(&["x=Alice".to_string()]).is_err());
        assert!(parse_mic_assignments(&["0=Alice".to_string()]).is_err());
    }
}
