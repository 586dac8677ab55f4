//! Tolerant extraction of the structured block from a completion response.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::ParsedAnalysis;
use crate::session::{CategoryResults, SessionStats};

#[derive(Deserialize)]
struct ResponseShape {
    #[serde(flatten)]
    results: CategoryResults,
    #[serde(default)]
    speaker_stats: Vec<crate::session::SpeakerStats>,
}

/// Parse the provider response. Accepts a bare JSON object, a ```json
/// fenced block, or an object embedded in surrounding prose.
pub(crate) fn parse_analysis(raw: &str) -> Result<ParsedAnalysis> {
    let block = extract_json_block(raw).context("No JSON object found in response")?;
    let shape: ResponseShape =
        serde_json::from_str(block).context("JSON block did not match the expected shape")?;
    Ok(ParsedAnalysis {
        results: shape.results,
        stats: SessionStats {
            speakers: shape.speaker_stats,
        },
    })
}

/// First balanced JSON object in the text, preferring fenced blocks.
fn extract_json_block(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```json") {
        let rest = &raw[start + 7..];
        if let Some(end) = rest.find("```") {
            let fenced = rest[..end].trim();
            if !fenced.is_empty() {
                return Some(fenced);
            }
        }
    }

    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
