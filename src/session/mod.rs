//! Session and audio-file documents.
//!
//! A `MovieSession` is one meeting's complete processing unit: the folder of
//! raw tracks, the per-file pipeline state, and the analysis output once the
//! AI stage has run. Sessions are persisted as documents through
//! [`SessionRepository`]; the pipeline itself owns no storage.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::pipeline::state::ProcessingStatus;

mod repository;

pub use repository::{JsonSessionRepository, SessionRepository};

/// One physical recording track and its pipeline state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFile {
    pub id: Uuid,
    pub file_name: String,
    pub file_path: PathBuf,
    pub file_size_bytes: u64,
    /// Zero-based microphone index. Unassigned until classified.
    pub speaker_number: Option<u32>,
    pub is_master_recording: bool,
    pub transcript_text: Option<String>,
    pub conversion_error: Option<String>,
    /// Identifier assigned by the transcription provider after upload.
    pub remote_id: Option<String>,
    pub status: ProcessingStatus,
    pub current_step: String,
    pub progress_percentage: u8,
    pub can_retry: bool,
    pub last_updated: DateTime<Utc>,
}

impl AudioFile {
    /// Build a new pending file record from a path on disk.
    pub fn new(path: &Path, size_bytes: u64) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4(),
            file_name,
            file_path: path.to_path_buf(),
            file_size_bytes: size_bytes,
            speaker_number: None,
            is_master_recording: false,
            transcript_text: None,
            conversion_error: None,
            remote_id: None,
            status: ProcessingStatus::Pending,
            current_step: "Waiting to start".to_string(),
            progress_percentage: 0,
            can_retry: false,
            last_updated: Utc::now(),
        }
    }

    /// MIME type derived from the file extension, for provider uploads.
    pub fn mime_type(&self) -> &'static str {
        match self.file_path.extension().and_then(|e| e.to_str()) {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("flac") => "audio/flac",
            Some("ogg") => "audio/ogg",
            Some("opus") => "audio/opus",
            _ => "application/octet-stream",
        }
    }
}

/// Session-level processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Validating,
    Transcribing,
    Analyzing,
    Complete,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Transcribing => "transcribing",
            Self::Analyzing => "analyzing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// True while a pipeline run is mid-flight. Callers check this before
    /// re-invoking the orchestrator for the same session.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Validating | Self::Transcribing | Self::Analyzing)
    }
}

/// One meeting's full set of recordings plus derived analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieSession {
    pub id: Uuid,
    pub date: NaiveDate,
    pub title: String,
    pub folder_path: PathBuf,
    /// Mic index (zero-based) to participant name.
    pub mic_assignments: BTreeMap<u32, String>,
    pub created_at: DateTime<Utc>,
    pub audio_files: Vec<AudioFile>,
    pub status: SessionStatus,
    pub error_message: Option<String>,
    pub session_stats: Option<SessionStats>,
    pub category_results: Option<CategoryResults>,
    /// Verbatim completion-provider response, kept so analysis can be
    /// re-parsed offline without paying for another provider call.
    pub raw_analysis_response: Option<String>,
}

impl MovieSession {
    pub fn new(title: String, date: NaiveDate, folder_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            title,
            folder_path,
            mic_assignments: BTreeMap::new(),
            created_at: Utc::now(),
            audio_files: Vec::new(),
            status: SessionStatus::Pending,
            error_message: None,
            session_stats: None,
            category_results: None,
            raw_analysis_response: None,
        }
    }

    pub fn file_mut(&mut self, id: Uuid) -> Option<&mut AudioFile> {
        self.audio_files.iter_mut().find(|f| f.id == id)
    }

    /// Participant name for a file, falling back to a generic label.
    pub fn speaker_name(&self, file: &AudioFile) -> String {
        match file.speaker_number {
            Some(n) => self
                .mic_assignments
                .get(&n)
                .cloned()
                .unwrap_or_else(|| format!("Speaker {}", n + 1)),
            None if file.is_master_recording => "Group".to_string(),
            None => file.file_name.clone(),
        }
    }
}

/// Aggregate per-speaker talk statistics from the AI analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    #[serde(default)]
    pub speakers: Vec<SpeakerStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerStats {
    pub speaker: String,
    #[serde(default)]
    pub talk_time_seconds: f64,
    #[serde(default)]
    pub question_count: u32,
    #[serde(default)]
    pub interruption_count: u32,
    #[serde(default)]
    pub profanity_count: u32,
}

/// Award-category winners plus the two ranked top-5 lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryResults {
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryWinner>,
    #[serde(default)]
    pub funniest: Vec<RankedQuote>,
    #[serde(default)]
    pub most_bland: Vec<RankedQuote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWinner {
    pub speaker: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub quote: String,
    #[serde(default)]
    pub reasoning: String,
    /// 0-10 entertainment score assigned by the analysis model.
    #[serde(default)]
    pub entertainment_score: u8,
    #[serde(default)]
    pub runners_up: Vec<RunnerUp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerUp {
    pub speaker: String,
    pub quote: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedQuote {
    pub rank: u32,
    pub speaker: String,
    pub quote: String,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_as_str() {
        assert_eq!(SessionStatus::Pending.as_str(), "pending");
        assert_eq!(SessionStatus::Validating.as_str(), "validating");
        assert_eq!(SessionStatus::Transcribing.as_str(), "transcribing");
        assert_eq!(SessionStatus::Analyzing.as_str(), "analyzing");
        assert_eq!(SessionStatus::Complete.as_str(), "complete");
        assert_eq!(SessionStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_session_status_in_progress() {
        assert!(SessionStatus::Validating.is_in_progress());
        assert!(SessionStatus::Transcribing.is_in_progress());
        assert!(SessionStatus::Analyzing.is_in_progress());
        assert!(!SessionStatus::Pending.is_in_progress());
        assert!(!SessionStatus::Complete.is_in_progress());
        assert!(!SessionStatus::Failed.is_in_progress());
    }

    #[test]
    fn test_audio_file_new_defaults() {
        let file = AudioFile::new(Path::new("/tmp/session/MIC1.WAV"), 42);
        assert_eq!(file.file_name, "MIC1.WAV");
        assert_eq!(file.file_size_bytes, 42);
        assert_eq!(file.status, ProcessingStatus::Pending);
        assert_eq!(file.progress_percentage, 0);
        assert!(file.speaker_number.is_none());
        assert!(!file.is_master_recording);
        assert!(!file.can_retry);
    }

    #[test]
    fn test_mime_type_from_extension() {
        let wav = AudioFile::new(Path::new("/tmp/a.wav"), 0);
        assert_eq!(wav.mime_type(), "audio/wav");
        let mp3 = AudioFile::new(Path::new("/tmp/a.mp3"), 0);
        assert_eq!(mp3.mime_type(), "audio/mpeg");
        let unknown = AudioFile::new(Path::new("/tmp/a.xyz"), 0);
        assert_eq!(unknown.mime_type(), "application/octet-stream");
    }

    #[test]
    fn test_speaker_name_resolution() {
        let mut session = MovieSession::new(
            "The Thing".to_string(),
            NaiveDate::from_ymd_opt(2025, 11, 2).unwrap(),
            PathBuf::from("/tmp/session"),
        );
        session.mic_assignments.insert(0, "Alice".to_string());

        let mut file = AudioFile::new(Path::new("/tmp/session/MIC1.WAV"), 0);
        file.speaker_number = Some(0);
        assert_eq!(session.speaker_name(&file), "Alice");

        file.speaker_number = Some(3);
        assert_eq!(session.speaker_name(&file), "Speaker 4");

        file.speaker_number = None;
        file.is_master_recording = true;
        assert_eq!(session.speaker_name(&file), "Group");
    }

    #[test]
    fn test_session_document_round_trips_through_json() {
        let session = MovieSession::new(
            "Alien".to_string(),
            NaiveDate::from_ymd_opt(2025, 10, 5).unwrap(),
            PathBuf::from("/tmp/alien"),
        );
        let json = serde_json::to_string(&session).unwrap();
        let parsed: MovieSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, session.id);
        assert_eq!(parsed.title, "Alien");
        assert_eq!(parsed.status, SessionStatus::Pending);
    }
}
