//! Workflow orchestrator.
//!
//! Drives the per-file state machine across every file in a session,
//! chaining convert, upload, transcribe and analyze. Each stage boundary is
//! a synchronization point: stage N+1 does not start until stage N has been
//! attempted for every selected file, and the session document is persisted
//! at every boundary. One file's failure never aborts its siblings; the
//! session fails only when no file produced a usable transcript.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::analysis::{self, AnalysisOutcome, CompletionProvider};
use crate::converter::AudioConverter;
use crate::session::{MovieSession, SessionRepository, SessionStatus};
use crate::transcription::TranscriptionClient;

use super::state::{self, PipelineStage, ProcessingStatus};
use super::{CancellationRegistry, ProgressCallback};

pub struct Orchestrator {
    converter: Arc<dyn AudioConverter>,
    transcription: Arc<dyn TranscriptionClient>,
    completion: Arc<dyn CompletionProvider>,
    repository: Arc<dyn SessionRepository>,
    cancellations: CancellationRegistry,
}

impl Orchestrator {
    pub fn new(
        converter: Arc<dyn AudioConverter>,
        transcription: Arc<dyn TranscriptionClient>,
        completion: Arc<dyn CompletionProvider>,
        repository: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            converter,
            transcription,
            completion,
            repository,
            cancellations: CancellationRegistry::new(),
        }
    }

    /// Handle callers use to cancel individual files mid-run.
    pub fn cancellations(&self) -> CancellationRegistry {
        self.cancellations.clone()
    }

    /// Run the pipeline for a session, starting at `start`. Files already
    /// at or past a stage are skipped by it; files behind it are brought
    /// forward. Missing provider credentials fail fast before any work.
    pub async fn process_from_stage(
        &self,
        session: &mut MovieSession,
        start: PipelineStage,
        progress: &ProgressCallback,
    ) -> Result<()> {
        if session.audio_files.is_empty() {
            bail!("Session '{}' has no audio files to process", session.title);
        }
        if !self.transcription.is_configured() {
            bail!("Transcription provider is not configured");
        }
        if !self.completion.is_configured() {
            bail!("AI completion provider is not configured");
        }

        info!(
            "Processing session '{}' from stage {} ({} files)",
            session.title,
            start.as_str(),
            session.audio_files.len()
        );

        for stage in start.and_following() {
            match stage {
                PipelineStage::Convert => self.run_convert_stage(session, progress).await?,
                PipelineStage::Upload => self.run_upload_stage(session, progress).await?,
                PipelineStage::Transcribe => self.run_transcribe_stage(session, progress).await?,
                PipelineStage::Analyze => self.run_analyze_stage(session, progress).await?,
            }

            self.repository
                .save(session)
                .context("Failed to persist session at stage boundary")?;

            let failed = session
                .audio_files
                .iter()
                .filter(|f| {
                    matches!(
                        f.status,
                        ProcessingStatus::Failed | ProcessingStatus::FailedMp3
                    )
                })
                .count();
            progress(
                &format!(
                    "{} stage finished ({} of {} files failed)",
                    stage.as_str(),
                    failed,
                    session.audio_files.len()
                ),
                aggregate_progress(session),
            );

            if session.status == SessionStatus::Failed {
                break;
            }
        }

        Ok(())
    }

    async fn run_convert_stage(
        &self,
        session: &mut MovieSession,
        progress: &ProgressCallback,
    ) -> Result<()> {
        session.status = SessionStatus::Validating;
        session.error_message = None;
        self.repository.save(session)?;

        let selected: Vec<usize> = (0..session.audio_files.len())
            .filter(|&i| state::needs_stage(session.audio_files[i].status, PipelineStage::Convert))
            .collect();
        let total = selected.len();
        info!("Convert stage: {} of {} files selected", total, session.audio_files.len());

        for (done, &idx) in selected.iter().enumerate() {
            let file_id = session.audio_files[idx].id;
            let file_name = session.audio_files[idx].file_name.clone();

            if self.cancellations.is_cancelled(file_id) {
                state::fail(&mut session.audio_files[idx], "Cancelled by user", false);
                continue;
            }

            {
                let file = &mut session.audio_files[idx];
                if file.status != ProcessingStatus::ConvertingToMp3 {
                    state::advance(
                        file,
                        ProcessingStatus::ConvertingToMp3,
                        format!("Converting {file_name}"),
                    )
                    .with_context(|| format!("Cannot start conversion for {file_name}"))?;
                }
                file.conversion_error = None;
            }

            // Stage-scoped percentage: finished files weigh 100, the file
            // in flight weighs its own percent.
            let file_progress: ProgressCallback = {
                let outer = progress.clone();
                let base = (done * 100) as u32;
                let total = total as u32;
                Arc::new(move |message: &str, percent: u8| {
                    let overall = ((base + percent as u32) / total.max(1)) as u8;
                    outer(message, overall);
                })
            };

            let input = session.audio_files[idx].file_path.clone();
            let result = self.converter.convert(&input, &file_progress).await;

            let file = &mut session.audio_files[idx];
            if self.cancellations.is_cancelled(file_id) {
                // The transcode already ran; its output is discarded.
                state::fail(file, "Cancelled by user", false);
                continue;
            }

            match result {
                Ok(converted) => {
                    file.file_name = converted
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| file.file_name.clone());
                    file.file_size_bytes = std::fs::metadata(&converted)
                        .map(|m| m.len())
                        .unwrap_or(file.file_size_bytes);
                    file.file_path = converted;
                    state::advance(file, ProcessingStatus::ProcessedMp3, "Ready for upload")
                        .with_context(|| format!("Cannot finish conversion for {file_name}"))?;
                }
                Err(e) => {
                    error!("Conversion failed for {}: {:#}", file_name, e);
                    state::fail_conversion(file, format!("{e:#}"));
                }
            }
        }

        Ok(())
    }

    async fn run_upload_stage(
        &self,
        session: &mut MovieSession,
        progress: &ProgressCallback,
    ) -> Result<()> {
        session.status = SessionStatus::Transcribing;
        self.repository.save(session)?;

        // Entry statuses include the stage's own in-progress state, so a
        // file left mid-upload by a crashed run is retried here.
        let selected: Vec<usize> = (0..session.audio_files.len())
            .filter(|&i| {
                PipelineStage::Upload
                    .entry_statuses()
                    .contains(&session.audio_files[i].status)
            })
            .collect();
        let total = selected.len();
        info!("Upload stage: {} files selected", total);

        for (done, &idx) in selected.iter().enumerate() {
            let file_id = session.audio_files[idx].id;
            let file_name = session.audio_files[idx].file_name.clone();

            if self.cancellations.is_cancelled(file_id) {
                state::fail(&mut session.audio_files[idx], "Cancelled by user", false);
                continue;
            }

            {
                let file = &mut session.audio_files[idx];
                if file.status != ProcessingStatus::UploadingToGladia {
                    state::advance(
                        file,
                        ProcessingStatus::UploadingToGladia,
                        format!("Uploading {file_name}"),
                    )
                    .with_context(|| format!("Cannot start upload for {file_name}"))?;
                }
            }
            progress(
                &format!("Uploading {file_name}"),
                ((done * 100) as u32 / (total as u32).max(1)) as u8,
            );

            let path = session.audio_files[idx].file_path.clone();
            let mime = session.audio_files[idx].mime_type();
            let result = self.transcription.upload(&path, mime).await;

            let file = &mut session.audio_files[idx];
            if self.cancellations.is_cancelled(file_id) {
                state::fail(file, "Cancelled by user", false);
                continue;
            }

            match result {
                Ok(remote_id) => {
                    file.remote_id = Some(remote_id);
                    state::advance(file, ProcessingStatus::UploadedToGladia, "Uploaded")
                        .with_context(|| format!("Cannot finish upload for {file_name}"))?;
                }
                Err(e) => {
                    error!("Upload failed for {}: {:#}", file_name, e);
                    state::fail(file, format!("Upload failed: {e:#}"), true);
                }
            }
        }

        Ok(())
    }

    async fn run_transcribe_stage(
        &self,
        session: &mut MovieSession,
        progress: &ProgressCallback,
    ) -> Result<()> {
        session.status = SessionStatus::Transcribing;
        self.repository.save(session)?;

        let selected: Vec<usize> = (0..session.audio_files.len())
            .filter(|&i| {
                PipelineStage::Transcribe
                    .entry_statuses()
                    .contains(&session.audio_files[i].status)
            })
            .collect();
        let total = selected.len();
        info!("Transcribe stage: {} files selected", total);

        for (done, &idx) in selected.iter().enumerate() {
            let file_id = session.audio_files[idx].id;
            let file_name = session.audio_files[idx].file_name.clone();

            if self.cancellations.is_cancelled(file_id) {
                state::fail(&mut session.audio_files[idx], "Cancelled by user", false);
                continue;
            }

            let Some(remote_id) = session.audio_files[idx].remote_id.clone() else {
                warn!("{} reached transcribe stage without a remote id", file_name);
                state::fail(
                    &mut session.audio_files[idx],
                    "No remote id recorded for this file",
                    true,
                );
                continue;
            };

            {
                let file = &mut session.audio_files[idx];
                if file.status != ProcessingStatus::Transcribing {
                    state::advance(
                        file,
                        ProcessingStatus::Transcribing,
                        format!("Waiting for transcript of {file_name}"),
                    )
                    .with_context(|| format!("Cannot start transcription for {file_name}"))?;
                }
            }
            progress(
                &format!("Transcribing {file_name}"),
                ((done * 100) as u32 / (total as u32).max(1)) as u8,
            );

            let result = self.transcription.retrieve(&remote_id).await;

            let file = &mut session.audio_files[idx];
            if self.cancellations.is_cancelled(file_id) {
                state::fail(file, "Cancelled by user", false);
                continue;
            }

            match result {
                Ok(text) => {
                    file.transcript_text = Some(text);
                    state::advance(
                        file,
                        ProcessingStatus::TranscriptionComplete,
                        "Transcript ready",
                    )
                    .with_context(|| format!("Cannot finish transcription for {file_name}"))?;
                }
                Err(e) => {
                    error!("Transcript retrieval failed for {}: {:#}", file_name, e);
                    state::fail(file, format!("Transcription failed: {e:#}"), true);
                }
            }
        }

        Ok(())
    }

    async fn run_analyze_stage(
        &self,
        session: &mut MovieSession,
        progress: &ProgressCallback,
    ) -> Result<()> {
        let usable = session
            .audio_files
            .iter()
            .filter(|f| f.transcript_text.is_some())
            .count();

        if usable == 0 {
            warn!("Session '{}' produced no usable transcript", session.title);
            session.status = SessionStatus::Failed;
            session.error_message =
                Some("No file produced a usable transcript".to_string());
            return Ok(());
        }

        session.status = SessionStatus::Analyzing;
        self.repository.save(session)?;
        progress("Analyzing transcripts", aggregate_progress(session));

        for file in &mut session.audio_files {
            if file.status == ProcessingStatus::TranscriptionComplete {
                state::advance(file, ProcessingStatus::ProcessingWithAi, "Analyzing")
                    .context("Cannot start analysis for file")?;
            }
        }

        match analysis::run_analysis(self.completion.as_ref(), session).await {
            Ok(AnalysisOutcome::Parsed) => {
                for file in &mut session.audio_files {
                    if file.status == ProcessingStatus::ProcessingWithAi {
                        state::advance(file, ProcessingStatus::Complete, "Complete")
                            .context("Cannot complete analysis for file")?;
                    }
                }
                session.status = SessionStatus::Complete;
                session.error_message = None;
                info!("Session '{}' complete", session.title);
            }
            Ok(AnalysisOutcome::RawRetained) => {
                // Not a session failure: the raw text is reprocessable
                // offline, so the session stays in the analyzing state.
                session.error_message = Some(
                    "Analysis response could not be parsed; raw response retained for reprocessing"
                        .to_string(),
                );
            }
            Err(e) => {
                error!("Analysis failed for session '{}': {:#}", session.title, e);
                for file in &mut session.audio_files {
                    if file.status == ProcessingStatus::ProcessingWithAi {
                        state::fail(file, "AI analysis failed", true);
                    }
                }
                session.status = SessionStatus::Failed;
                session.error_message = Some(format!("AI analysis failed: {e:#}"));
            }
        }

        Ok(())
    }
}

/// Re-parse a session's cached analysis response offline and, if it now
/// parses, walk the analyzed files to `Complete`. No provider is involved.
pub fn reanalyze_from_cached(session: &mut MovieSession) -> Result<AnalysisOutcome> {
    let outcome = analysis::reprocess_from_raw(session)?;
    if outcome == AnalysisOutcome::Parsed {
        for file in &mut session.audio_files {
            if file.status == ProcessingStatus::ProcessingWithAi {
                state::advance(file, ProcessingStatus::Complete, "Complete")
                    .context("Cannot complete analysis for file")?;
            }
        }
        session.status = SessionStatus::Complete;
        session.error_message = None;
    }
    Ok(outcome)
}

/// Session-level percentage: completed files weigh 100, in-progress files
/// weigh their stage-local percentage, pending and failed files weigh 0.
/// Failed files stay in the denominator so overall progress never moves
/// backward as files fail.
pub fn aggregate_progress(session: &MovieSession) -> u8 {
    if session.audio_files.is_empty() {
        return 0;
    }
    let total: u32 = session
        .audio_files
        .iter()
        .map(|f| match f.status {
            ProcessingStatus::Complete => 100u32,
            ProcessingStatus::Pending
            | ProcessingStatus::Failed
            | ProcessingStatus::FailedMp3 => 0,
            _ => f.progress_percentage as u32,
        })
        .sum();
    (total / session.audio_files.len() as u32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::{Path, PathBuf};

    use crate::session::AudioFile;

    fn session_with_files(statuses: &[(ProcessingStatus, u8)]) -> MovieSession {
        let mut session = MovieSession::new(
            "Heat".to_string(),
            NaiveDate::from_ymd_opt(2025, 1, 12).unwrap(),
            PathBuf::from("/tmp/heat"),
        );
        for (i, &(status, pct)) in statuses.iter().enumerate() {
            let mut f = AudioFile::new(Path::new(&format!("/tmp/heat/MIC{}.WAV", i + 1)), 10);
            f.status = status;
            f.progress_percentage = pct;
            session.audio_files.push(f);
        }
        session
    }

    #[test]
    fn test_weighted_aggregate() {
        let session = session_with_files(&[
            (ProcessingStatus::Complete, 0),
            (ProcessingStatus::ConvertingToMp3, 50),
            (ProcessingStatus::Pending, 0),
        ]);
        assert_eq!(aggregate_progress(&session), 50);
    }

    #[test]
    fn test_failed_files_stay_in_denominator() {
        let session = session_with_files(&[
            (ProcessingStatus::Complete, 0),
            (ProcessingStatus::Failed, 70),
        ]);
        assert_eq!(aggregate_progress(&session), 50);
    }

    #[test]
    fn test_empty_session_is_zero() {
        let session = session_with_files(&[]);
        assert_eq!(aggregate_progress(&session), 0);
    }
}
