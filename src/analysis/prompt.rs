//! Analysis prompt assembly.

use std::fmt::Write;

use crate::session::MovieSession;

const CATEGORIES: &[(&str, &str)] = &[
    ("Hottest Take", "the most outrageous or contrarian opinion"),
    ("Best Joke", "the funniest intentional joke"),
    ("Biggest Tangent", "the moment the discussion drifted furthest from the movie"),
    ("Most Savage Burn", "the harshest roast of a person or the movie"),
    ("Deepest Insight", "the most genuinely thoughtful observation"),
];

/// Compose the single completion request for a session: instructions, the
/// expected JSON shape, session metadata, then every transcript labeled by
/// speaker.
pub fn build_prompt(session: &MovieSession) -> String {
    let mut prompt = String::new();

    let participants: Vec<&str> = session
        .mic_assignments
        .values()
        .map(String::as_str)
        .collect();

    writeln!(
        prompt,
        "You are analyzing transcripts from a movie-night discussion of \
         \"{}\" held on {}. Participants: {}.",
        session.title,
        session.date,
        if participants.is_empty() {
            "unknown".to_string()
        } else {
            participants.join(", ")
        }
    )
    .ok();

    writeln!(prompt, "\nAward one winner per category:").ok();
    for (name, description) in CATEGORIES {
        writeln!(prompt, "- {name}: {description}").ok();
    }

    prompt.push_str(
        "\nAlso produce:\n\
         - the top 5 funniest quotes and the top 5 most bland quotes, ranked\n\
         - per-speaker statistics: talk time in seconds, questions asked, \
         interruptions, profanity count\n\
         \n\
         Respond with exactly one JSON object in a ```json fence, shaped as:\n\
         {\n\
           \"categories\": { \"<category>\": { \"speaker\", \"timestamp\", \
         \"quote\", \"reasoning\", \"entertainment_score\" (0-10), \
         \"runners_up\": [{ \"speaker\", \"quote\", \"timestamp\" }] } },\n\
           \"funniest\": [{ \"rank\", \"speaker\", \"quote\", \"reasoning\" }],\n\
           \"most_bland\": [{ \"rank\", \"speaker\", \"quote\", \"reasoning\" }],\n\
           \"speaker_stats\": [{ \"speaker\", \"talk_time_seconds\", \
         \"question_count\", \"interruption_count\", \"profanity_count\" }]\n\
         }\n",
    );

    prompt.push_str("\n--- TRANSCRIPTS ---\n");
    for file in &session.audio_files {
        let Some(transcript) = &file.transcript_text else {
            continue;
        };
        let label = session.speaker_name(file);
        let role = if file.is_master_recording {
            " (master mix, all speakers)"
        } else {
            ""
        };
        writeln!(prompt, "\n## {label}{role}\n{transcript}").ok();
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AudioFile;
    use chrono::NaiveDate;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_prompt_contains_metadata_and_transcripts() {
        let mut session = MovieSession::new(
            "The Room".to_string(),
            NaiveDate::from_ymd_opt(2025, 4, 6).unwrap(),
            PathBuf::from("/tmp/room"),
        );
        session.mic_assignments.insert(0, "Alice".to_string());
        session.mic_assignments.insert(1, "Bob".to_string());

        let mut mic = AudioFile::new(Path::new("/tmp/room/MIC1.mp3"), 1);
        mic.speaker_number = Some(0);
        mic.transcript_text = Some("Oh hi Mark.".to_string());
        session.audio_files.push(mic);

        let mut master = AudioFile::new(Path::new("/tmp/room/master_recording.mp3"), 1);
        master.is_master_recording = true;
        master.transcript_text = Some("Everyone talking at once.".to_string());
        session.audio_files.push(master);

        let mut untranscribed = AudioFile::new(Path::new("/tmp/room/MIC2.mp3"), 1);
        untranscribed.speaker_number = Some(1);
        session.audio_files.push(untranscribed);

        let prompt = build_prompt(&session);
        assert!(prompt.contains("The Room"));
        assert!(prompt.contains("2025-04-06"));
        assert!(prompt.contains("Alice, Bob"));
        assert!(prompt.contains("## Alice\nOh hi Mark."));
        assert!(prompt.contains("master mix"));
        assert!(prompt.contains("Hottest Take"));
        // Files without transcripts are left out.
        assert!(!prompt.contains("## Bob"));
    }
}
