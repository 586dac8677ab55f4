//! Per-file pipeline state machine.
//!
//! Every audio file walks the same ladder: convert to MP3, upload to the
//! transcription provider, retrieve the transcript, feed the AI stage. The
//! machine validates transitions against an explicit table, so "is this file
//! already past stage X" is answered by a stage-graph lookup instead of
//! comparing enum ordinals.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::AudioFile;

/// Lifecycle state of a single audio file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Uploading,
    ConvertingToMp3,
    FailedMp3,
    ProcessedMp3,
    UploadingToGladia,
    UploadedToGladia,
    Transcribing,
    TranscriptionComplete,
    ProcessingWithAi,
    Complete,
    /// Universal failure state, reachable from any in-progress state.
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::ConvertingToMp3 => "converting_to_mp3",
            Self::FailedMp3 => "failed_mp3",
            Self::ProcessedMp3 => "processed_mp3",
            Self::UploadingToGladia => "uploading_to_gladia",
            Self::UploadedToGladia => "uploaded_to_gladia",
            Self::Transcribing => "transcribing",
            Self::TranscriptionComplete => "transcription_complete",
            Self::ProcessingWithAi => "processing_with_ai",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// Terminal for a run; only re-enterable via [`reset_to_state`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub const ALL: &'static [ProcessingStatus] = &[
        Self::Pending,
        Self::Uploading,
        Self::ConvertingToMp3,
        Self::FailedMp3,
        Self::ProcessedMp3,
        Self::UploadingToGladia,
        Self::UploadedToGladia,
        Self::Transcribing,
        Self::TranscriptionComplete,
        Self::ProcessingWithAi,
        Self::Complete,
        Self::Failed,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        let needle = s.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|v| v.as_str() == needle)
    }

    /// Position on the happy-path ladder, used only to decide whether a
    /// reset moves backward. `FailedMp3` sits beside `ConvertingToMp3`;
    /// `Failed` is off-ladder and may be reset to anything.
    fn ladder_index(&self) -> Option<usize> {
        LADDER.iter().position(|s| s == self).or(match self {
            Self::FailedMp3 => Self::ConvertingToMp3.ladder_index(),
            _ => None,
        })
    }
}

/// Happy-path order of states. This is documentation of the ladder, not a
/// transition table; legality lives in [`legal_transitions`].
const LADDER: &[ProcessingStatus] = &[
    ProcessingStatus::Pending,
    ProcessingStatus::Uploading,
    ProcessingStatus::ConvertingToMp3,
    ProcessingStatus::ProcessedMp3,
    ProcessingStatus::UploadingToGladia,
    ProcessingStatus::UploadedToGladia,
    ProcessingStatus::Transcribing,
    ProcessingStatus::TranscriptionComplete,
    ProcessingStatus::ProcessingWithAi,
    ProcessingStatus::Complete,
];

/// One step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Convert,
    Upload,
    Transcribe,
    Analyze,
}

impl PipelineStage {
    pub const ALL: &'static [PipelineStage] = &[
        Self::Convert,
        Self::Upload,
        Self::Transcribe,
        Self::Analyze,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Convert => "convert",
            Self::Upload => "upload",
            Self::Transcribe => "transcribe",
            Self::Analyze => "analyze",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "convert" => Some(Self::Convert),
            "upload" => Some(Self::Upload),
            "transcribe" => Some(Self::Transcribe),
            "analyze" => Some(Self::Analyze),
            _ => None,
        }
    }

    fn position(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    /// Stages from `self` to the end of the pipeline, inclusive.
    pub fn and_following(&self) -> &'static [PipelineStage] {
        &Self::ALL[self.position()..]
    }

    /// Statuses a file may be in for this stage to start on it. The first
    /// entry is the canonical prerequisite; the rest are retry entry points.
    pub fn entry_statuses(&self) -> &'static [ProcessingStatus] {
        match self {
            Self::Convert => &[
                ProcessingStatus::Pending,
                ProcessingStatus::Uploading,
                ProcessingStatus::ConvertingToMp3,
                ProcessingStatus::FailedMp3,
            ],
            Self::Upload => &[
                ProcessingStatus::ProcessedMp3,
                ProcessingStatus::UploadingToGladia,
            ],
            Self::Transcribe => &[
                ProcessingStatus::UploadedToGladia,
                ProcessingStatus::Transcribing,
            ],
            Self::Analyze => &[
                ProcessingStatus::TranscriptionComplete,
                ProcessingStatus::ProcessingWithAi,
            ],
        }
    }

    /// The status a file carries once this stage has finished for it.
    pub fn completion_status(&self) -> ProcessingStatus {
        match self {
            Self::Convert => ProcessingStatus::ProcessedMp3,
            Self::Upload => ProcessingStatus::UploadedToGladia,
            Self::Transcribe => ProcessingStatus::TranscriptionComplete,
            Self::Analyze => ProcessingStatus::Complete,
        }
    }
}

/// The last stage a status certifies as finished, if any.
fn last_completed_stage(status: ProcessingStatus) -> Option<PipelineStage> {
    match status {
        ProcessingStatus::ProcessedMp3 | ProcessingStatus::UploadingToGladia => {
            Some(PipelineStage::Convert)
        }
        ProcessingStatus::UploadedToGladia | ProcessingStatus::Transcribing => {
            Some(PipelineStage::Upload)
        }
        ProcessingStatus::TranscriptionComplete | ProcessingStatus::ProcessingWithAi => {
            Some(PipelineStage::Transcribe)
        }
        ProcessingStatus::Complete => Some(PipelineStage::Analyze),
        _ => None,
    }
}

/// True when the file's status certifies `stage` (and everything before it)
/// as already done.
pub fn is_at_or_past(status: ProcessingStatus, stage: PipelineStage) -> bool {
    match last_completed_stage(status) {
        Some(done) => done.position() >= stage.position(),
        None => false,
    }
}

/// True when `stage` still has work to do for a file in `status`.
/// A universal `Failed` file is excluded; it only re-enters via reset.
pub fn needs_stage(status: ProcessingStatus, stage: PipelineStage) -> bool {
    status != ProcessingStatus::Failed && !is_at_or_past(status, stage)
}

/// Legal forward transitions. `Failed` is reachable from any in-progress
/// state via [`fail`], so it is not listed here.
fn legal_transitions(from: ProcessingStatus) -> &'static [ProcessingStatus] {
    use ProcessingStatus::*;
    match from {
        Pending => &[Uploading, ConvertingToMp3],
        Uploading => &[ConvertingToMp3],
        ConvertingToMp3 => &[ProcessedMp3, FailedMp3],
        FailedMp3 => &[ConvertingToMp3],
        ProcessedMp3 => &[UploadingToGladia],
        UploadingToGladia => &[UploadedToGladia],
        UploadedToGladia => &[Transcribing],
        Transcribing => &[TranscriptionComplete],
        TranscriptionComplete => &[ProcessingWithAi],
        ProcessingWithAi => &[Complete],
        Complete | Failed => &[],
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("illegal transition from {from} to {to}")]
    Illegal { from: &'static str, to: &'static str },
    #[error("reset target {target} is not behind current state {current}")]
    ForwardReset {
        current: &'static str,
        target: &'static str,
    },
}

/// Advance a file to the next status, validating against the transition
/// table. Progress resets to 0 on every state change.
pub fn advance(
    file: &mut AudioFile,
    to: ProcessingStatus,
    step: impl Into<String>,
) -> Result<(), TransitionError> {
    if !legal_transitions(file.status).contains(&to) {
        return Err(TransitionError::Illegal {
            from: file.status.as_str(),
            to: to.as_str(),
        });
    }
    file.status = to;
    file.current_step = step.into();
    file.progress_percentage = 0;
    file.can_retry = false;
    file.last_updated = Utc::now();
    Ok(())
}

/// Move a file to the universal `Failed` state with a display-ready reason.
pub fn fail(file: &mut AudioFile, reason: impl Into<String>, can_retry: bool) {
    file.status = ProcessingStatus::Failed;
    file.current_step = reason.into();
    file.progress_percentage = 0;
    file.can_retry = can_retry;
    file.last_updated = Utc::now();
}

/// Record conversion failure on the file. Distinct from [`fail`] because the
/// convert stage has its own failure state so siblings keep their meaning.
pub fn fail_conversion(file: &mut AudioFile, error: impl Into<String>) {
    let error = error.into();
    file.status = ProcessingStatus::FailedMp3;
    file.current_step = format!("Conversion failed: {error}");
    file.conversion_error = Some(error);
    file.progress_percentage = 0;
    file.can_retry = true;
    file.last_updated = Utc::now();
}

/// Update stage-local progress without changing state.
pub fn set_progress(file: &mut AudioFile, percent: u8, step: impl Into<String>) {
    file.progress_percentage = percent.min(100);
    file.current_step = step.into();
    file.last_updated = Utc::now();
}

/// Force a file back to an earlier state, for re-convert / re-upload /
/// redo-analysis flows. Only backward moves (or to `Pending`) are allowed.
pub fn reset_to_state(
    file: &mut AudioFile,
    target: ProcessingStatus,
) -> Result<(), TransitionError> {
    let allowed = match (file.status.ladder_index(), target.ladder_index()) {
        // Off-ladder current state (universal Failed): any ladder target.
        (None, Some(_)) => true,
        (Some(current), Some(idx)) => {
            target == ProcessingStatus::Pending || idx < current
        }
        // Resetting *to* Failed is never a reset.
        (_, None) => false,
    };

    if !allowed {
        return Err(TransitionError::ForwardReset {
            current: file.status.as_str(),
            target: target.as_str(),
        });
    }

    file.status = target;
    file.current_step = format!("Reset to {}", target.as_str());
    file.progress_percentage = 0;
    file.conversion_error = None;
    file.can_retry = false;
    file.last_updated = Utc::now();
    Ok(())
}

/// Whether `stage` may be (re)started for the file right now: either the
/// file sits exactly at a stage entry point, or it is already at/past the
/// stage and the caller wants an explicit redo.
pub fn can_start_step(file: &AudioFile, stage: PipelineStage) -> bool {
    stage.entry_statuses().contains(&file.status) || is_at_or_past(file.status, stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn file_at(status: ProcessingStatus) -> AudioFile {
        let mut f = AudioFile::new(Path::new("/tmp/MIC1.WAV"), 10);
        f.status = status;
        f
    }

    #[test]
    fn test_happy_path_walk() {
        use ProcessingStatus::*;
        let mut f = file_at(Pending);
        for (to, step) in [
            (ConvertingToMp3, "Converting"),
            (ProcessedMp3, "Converted"),
            (UploadingToGladia, "Uploading"),
            (UploadedToGladia, "Uploaded"),
            (Transcribing, "Transcribing"),
            (TranscriptionComplete, "Transcript ready"),
            (ProcessingWithAi, "Analyzing"),
            (Complete, "Done"),
        ] {
            advance(&mut f, to, step).unwrap();
            assert_eq!(f.status, to);
            assert_eq!(f.progress_percentage, 0);
        }
    }

    #[test]
    fn test_pending_to_complete_is_rejected() {
        let mut f = file_at(ProcessingStatus::Pending);
        let err = advance(&mut f, ProcessingStatus::Complete, "nope").unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                from: "pending",
                to: "complete"
            }
        );
        assert_eq!(f.status, ProcessingStatus::Pending);
    }

    #[test]
    fn test_skipping_upload_is_rejected() {
        let mut f = file_at(ProcessingStatus::ProcessedMp3);
        assert!(advance(&mut f, ProcessingStatus::Transcribing, "nope").is_err());
    }

    #[test]
    fn test_failed_mp3_can_retry_conversion() {
        let mut f = file_at(ProcessingStatus::ConvertingToMp3);
        fail_conversion(&mut f, "unsupported codec");
        assert_eq!(f.status, ProcessingStatus::FailedMp3);
        assert!(f.can_retry);
        assert_eq!(f.conversion_error.as_deref(), Some("unsupported codec"));

        advance(&mut f, ProcessingStatus::ConvertingToMp3, "Retrying").unwrap();
        assert_eq!(f.status, ProcessingStatus::ConvertingToMp3);
    }

    #[test]
    fn test_fail_reachable_from_any_in_progress_state() {
        for status in [
            ProcessingStatus::Uploading,
            ProcessingStatus::ConvertingToMp3,
            ProcessingStatus::UploadingToGladia,
            ProcessingStatus::Transcribing,
            ProcessingStatus::ProcessingWithAi,
        ] {
            let mut f = file_at(status);
            fail(&mut f, "network error", true);
            assert_eq!(f.status, ProcessingStatus::Failed);
            assert!(f.can_retry);
        }
    }

    #[test]
    fn test_reset_backward_allowed() {
        let mut f = file_at(ProcessingStatus::TranscriptionComplete);
        f.conversion_error = Some("stale".to_string());
        f.progress_percentage = 80;

        reset_to_state(&mut f, ProcessingStatus::ProcessedMp3).unwrap();
        assert_eq!(f.status, ProcessingStatus::ProcessedMp3);
        assert_eq!(f.progress_percentage, 0);
        assert!(f.conversion_error.is_none());
    }

    #[test]
    fn test_reset_forward_rejected() {
        let mut f = file_at(ProcessingStatus::ProcessedMp3);
        let err = reset_to_state(&mut f, ProcessingStatus::Transcribing).unwrap_err();
        assert!(matches!(err, TransitionError::ForwardReset { .. }));
    }

    #[test]
    fn test_reset_from_failed_allowed_anywhere() {
        let mut f = file_at(ProcessingStatus::Failed);
        reset_to_state(&mut f, ProcessingStatus::UploadedToGladia).unwrap();
        assert_eq!(f.status, ProcessingStatus::UploadedToGladia);
    }

    #[test]
    fn test_reset_to_failed_rejected() {
        let mut f = file_at(ProcessingStatus::Complete);
        assert!(reset_to_state(&mut f, ProcessingStatus::Failed).is_err());
    }

    #[test]
    fn test_is_at_or_past_uses_stage_graph() {
        assert!(is_at_or_past(
            ProcessingStatus::UploadedToGladia,
            PipelineStage::Convert
        ));
        assert!(is_at_or_past(
            ProcessingStatus::UploadedToGladia,
            PipelineStage::Upload
        ));
        assert!(!is_at_or_past(
            ProcessingStatus::UploadedToGladia,
            PipelineStage::Transcribe
        ));
        assert!(!is_at_or_past(
            ProcessingStatus::Pending,
            PipelineStage::Convert
        ));
        assert!(is_at_or_past(
            ProcessingStatus::Complete,
            PipelineStage::Analyze
        ));
    }

    #[test]
    fn test_needs_stage_excludes_universal_failed() {
        assert!(needs_stage(ProcessingStatus::Pending, PipelineStage::Convert));
        assert!(needs_stage(
            ProcessingStatus::FailedMp3,
            PipelineStage::Convert
        ));
        assert!(!needs_stage(
            ProcessingStatus::Failed,
            PipelineStage::Convert
        ));
        assert!(!needs_stage(
            ProcessingStatus::ProcessedMp3,
            PipelineStage::Convert
        ));
    }

    #[test]
    fn test_can_start_step() {
        let f = file_at(ProcessingStatus::ProcessedMp3);
        assert!(can_start_step(&f, PipelineStage::Upload));
        assert!(!can_start_step(&f, PipelineStage::Transcribe));
        // Already past convert, so an explicit redo is permitted.
        assert!(can_start_step(&f, PipelineStage::Convert));

        let f = file_at(ProcessingStatus::Pending);
        assert!(can_start_step(&f, PipelineStage::Convert));
        assert!(!can_start_step(&f, PipelineStage::Upload));
        assert!(!can_start_step(&f, PipelineStage::Analyze));
    }

    #[test]
    fn test_stage_parse_round_trip() {
        for stage in PipelineStage::ALL {
            assert_eq!(PipelineStage::parse(stage.as_str()), Some(*stage));
        }
        assert_eq!(PipelineStage::parse("ANALYZE"), Some(PipelineStage::Analyze));
        assert_eq!(PipelineStage::parse("bogus"), None);
    }

    #[test]
    fn test_and_following() {
        assert_eq!(PipelineStage::Convert.and_following().len(), 4);
        assert_eq!(
            PipelineStage::Transcribe.and_following(),
            &[PipelineStage::Transcribe, PipelineStage::Analyze]
        );
    }
}
