//! AI analysis stage.
//!
//! Assembles every transcript plus session metadata into one completion
//! request and parses the structured block out of the response. Parsing is
//! tolerant: a response that cannot be parsed is retained verbatim on the
//! session so it can be re-parsed later without another provider call.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::session::{CategoryResults, MovieSession, SessionStats};

mod openai;
mod parse;
mod prompt;

pub use openai::OpenAiCompletionProvider;
pub use prompt::build_prompt;

/// External AI completion provider: one composed prompt in, free-form text
/// expected to contain a parseable structured block out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn is_configured(&self) -> bool;
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// What the analysis run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// Structured results parsed and stored on the session.
    Parsed,
    /// Provider responded but the structured block could not be parsed; the
    /// raw text is retained for offline reprocessing.
    RawRetained,
}

/// Run the analysis stage for a session whose transcripts are in place.
/// Provider errors propagate; a malformed response does not, because the
/// raw text is still worth keeping.
pub async fn run_analysis(
    provider: &dyn CompletionProvider,
    session: &mut MovieSession,
) -> Result<AnalysisOutcome> {
    if !provider.is_configured() {
        bail!("AI completion provider is not configured");
    }

    let transcribed = session
        .audio_files
        .iter()
        .filter(|f| f.transcript_text.is_some())
        .count();
    if transcribed == 0 {
        bail!("Session has no transcripts to analyze");
    }

    let prompt = prompt::build_prompt(session);
    info!(
        "Requesting analysis for session '{}' ({} transcripts, {} prompt chars)",
        session.title,
        transcribed,
        prompt.len()
    );

    let raw = provider
        .complete(&prompt)
        .await
        .context("AI completion request failed")?;

    session.raw_analysis_response = Some(raw.clone());
    apply_parsed(session, &raw)
}

/// Re-parse the cached raw response without calling the provider. The
/// cost-control escape hatch for responses that needed a parser fix.
pub fn reprocess_from_raw(session: &mut MovieSession) -> Result<AnalysisOutcome> {
    let raw = session
        .raw_analysis_response
        .clone()
        .context("Session has no cached analysis response to reprocess")?;
    apply_parsed(session, &raw)
}

fn apply_parsed(session: &mut MovieSession, raw: &str) -> Result<AnalysisOutcome> {
    match parse::parse_analysis(raw) {
        Ok(parsed) => {
            session.category_results = Some(parsed.results);
            session.session_stats = Some(parsed.stats);
            info!("Analysis parsed for session '{}'", session.title);
            Ok(AnalysisOutcome::Parsed)
        }
        Err(e) => {
            warn!(
                "Analysis response for session '{}' could not be parsed ({}); raw response retained",
                session.title, e
            );
            Ok(AnalysisOutcome::RawRetained)
        }
    }
}

pub(crate) struct ParsedAnalysis {
    pub results: CategoryResults,
    pub stats: SessionStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::{Path, PathBuf};

    use crate::session::AudioFile;

    struct CannedProvider {
        response: String,
    }

    #[async_trait]
    impl CompletionProvider for CannedProvider {
        fn is_configured(&self) -> bool {
            true
        }
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    fn session_with_transcript() -> MovieSession {
        let mut session = MovieSession::new(
            "Tremors".to_string(),
            NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
            PathBuf::from("/tmp/tremors"),
        );
        let mut file = AudioFile::new(Path::new("/tmp/tremors/MIC1.mp3"), 10);
        file.speaker_number = Some(0);
        file.transcript_text = Some("That was the worst plan I have ever heard.".to_string());
        session.audio_files.push(file);
        session
    }

    const GOOD_RESPONSE: &str = r#"Here are the results:
```json
{
  "categories": {
    "Hottest Take": {
      "speaker": "Alice",
      "timestamp": "00:14:32",
      "quote": "That was the worst plan I have ever heard.",
      "reasoning": "Delivered with total conviction.",
      "entertainment_score": 8,
      "runners_up": []
    }
  },
  "funniest": [
    { "rank": 1, "speaker": "Alice", "quote": "worst plan", "reasoning": null }
  ],
  "most_bland": [],
  "speaker_stats": [
    { "speaker": "Alice", "talk_time_seconds": 812.5, "question_count": 4,
      "interruption_count": 2, "profanity_count": 1 }
  ]
}
```"#;

    #[tokio::test]
    async fn test_run_analysis_parses_structured_block() {
        let provider = CannedProvider {
            response: GOOD_RESPONSE.to_string(),
        };
        let mut session = session_with_transcript();

        let outcome = run_analysis(&provider, &mut session).await.unwrap();
        assert_eq!(outcome, AnalysisOutcome::Parsed);

        let results = session.category_results.as_ref().unwrap();
        let winner = results.categories.get("Hottest Take").unwrap();
        assert_eq!(winner.speaker, "Alice");
        assert_eq!(winner.entertainment_score, 8);
        assert_eq!(results.funniest.len(), 1);

        let stats = session.session_stats.as_ref().unwrap();
        assert_eq!(stats.speakers[0].question_count, 4);
        assert!(session.raw_analysis_response.is_some());
    }

    #[tokio::test]
    async fn test_malformed_response_retains_raw() {
        let provider = CannedProvider {
            response: "Sorry, I had trouble with that request.".to_string(),
        };
        let mut session = session_with_transcript();

        let outcome = run_analysis(&provider, &mut session).await.unwrap();
        assert_eq!(outcome, AnalysisOutcome::RawRetained);
        assert!(session.category_results.is_none());
        assert_eq!(
            session.raw_analysis_response.as_deref(),
            Some("Sorry, I had trouble with that request.")
        );
    }

    #[tokio::test]
    async fn test_no_transcripts_is_an_error() {
        let provider = CannedProvider {
            response: GOOD_RESPONSE.to_string(),
        };
        let mut session = session_with_transcript();
        session.audio_files[0].transcript_text = None;

        assert!(run_analysis(&provider, &mut session).await.is_err());
    }

    #[test]
    fn test_reprocess_from_raw() {
        let mut session = session_with_transcript();
        session.raw_analysis_response = Some(GOOD_RESPONSE.to_string());

        let outcome = reprocess_from_raw(&mut session).unwrap();
        assert_eq!(outcome, AnalysisOutcome::Parsed);
        assert!(session.category_results.is_some());
    }

    #[test]
    fn test_reprocess_without_cache_is_an_error() {
        let mut session = session_with_transcript();
        assert!(reprocess_from_raw(&mut session).is_err());
    }
}
