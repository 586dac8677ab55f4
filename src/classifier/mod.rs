//! Raw media file classification.
//!
//! Inspects a session folder and assigns each media file a role: numbered
//! microphone track, auxiliary channel (phone, sound pad), or master mix.
//! The master file is renamed to a canonical name so downstream stages can
//! find it deterministically.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::session::AudioFile;

/// Canonical file stem the master mix is renamed to.
pub const MASTER_CANONICAL_STEM: &str = "master_recording";

/// Below this size the largest-unclassified fallback refuses to guess and
/// the session proceeds without a master mix (degraded, not fatal).
const MIN_MASTER_FALLBACK_BYTES: u64 = 1024 * 1024;

const MEDIA_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "flac", "ogg", "opus"];

const AUX_CHANNEL_STEMS: &[&str] = &["phone", "soundpad", "sound_pad", "sfx"];

const MASTER_KEYWORDS: &[&str] = &["master", "combined", "group", "full"];

pub struct FileClassifier {
    mic_pattern: Regex,
    date_stamp_pattern: Regex,
}

impl Default for FileClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FileClassifier {
    pub fn new() -> Self {
        Self {
            // MIC1 / TRACK2 style stems; the captured index is one-based.
            mic_pattern: Regex::new(r"(?i)^(?:mic|track)(\d+)$").unwrap(),
            date_stamp_pattern: Regex::new(r"^\d{4}-?\d{2}-?\d{2}").unwrap(),
        }
    }

    /// Classify every media file directly inside `folder`, renaming the
    /// identified master mix to [`MASTER_CANONICAL_STEM`]. Returns the file
    /// records ordered by name. `mic_assignments` maps zero-based mic index
    /// to participant name and is used only for validation logging.
    pub fn classify_folder(
        &self,
        folder: &Path,
        mic_assignments: &std::collections::BTreeMap<u32, String>,
    ) -> Result<Vec<AudioFile>> {
        let mut files = self.scan_folder(folder)?;
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        let mut master_found = false;
        let mut aux_indices = Vec::new();

        for (idx, file) in files.iter_mut().enumerate() {
            let stem = file_stem_lower(&file.file_name);

            if let Some(caps) = self.mic_pattern.captures(&stem) {
                let one_based: u32 = caps[1].parse().unwrap_or(0);
                let speaker = one_based.saturating_sub(1);
                file.speaker_number = Some(speaker);
                file.current_step = format!("Microphone track {one_based}");
                if !mic_assignments.contains_key(&speaker) {
                    warn!(
                        "Mic track {} has no participant assignment",
                        file.file_name
                    );
                }
                debug!("Classified {} as mic track (speaker {})", file.file_name, speaker);
                continue;
            }

            if AUX_CHANNEL_STEMS.contains(&stem.as_str()) {
                file.current_step = "Auxiliary channel".to_string();
                aux_indices.push(idx);
                debug!("Classified {} as auxiliary channel", file.file_name);
                continue;
            }

            let keyword_hit = MASTER_KEYWORDS.iter().any(|k| stem.contains(k));
            if !master_found && (keyword_hit || self.date_stamp_pattern.is_match(&stem)) {
                file.is_master_recording = true;
                file.current_step = "Master recording".to_string();
                master_found = true;
                debug!("Classified {} as master recording", file.file_name);
            }
        }

        if !master_found {
            master_found = self.assign_master_by_size(&mut files, &aux_indices);
        }

        if master_found {
            self.rename_master(&mut files)?;
        } else {
            warn!(
                "No master recording identified in {:?}; analysis will run without a master mix",
                folder
            );
        }

        info!(
            "Classified {} media files in {:?} (master: {})",
            files.len(),
            folder,
            master_found
        );
        Ok(files)
    }

    fn scan_folder(&self, folder: &Path) -> Result<Vec<AudioFile>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(folder).max_depth(1).into_iter() {
            let entry = entry.context("Failed to scan session folder")?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_media = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| MEDIA_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if !is_media {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(AudioFile::new(path, size));
        }
        Ok(files)
    }

    /// Fallback heuristic: the single largest unclassified file is assumed
    /// to be the master mix, provided it is large enough to be one.
    fn assign_master_by_size(&self, files: &mut [AudioFile], aux_indices: &[usize]) -> bool {
        let candidate = files
            .iter()
            .enumerate()
            .filter(|(idx, f)| {
                f.speaker_number.is_none()
                    && !f.is_master_recording
                    && !aux_indices.contains(idx)
            })
            .max_by_key(|(_, f)| f.file_size_bytes)
            .map(|(idx, _)| idx);

        match candidate {
            Some(idx) if files[idx].file_size_bytes >= MIN_MASTER_FALLBACK_BYTES => {
                files[idx].is_master_recording = true;
                files[idx].current_step = "Master recording (by size)".to_string();
                info!(
                    "Assigned {} as master recording by size ({} bytes)",
                    files[idx].file_name, files[idx].file_size_bytes
                );
                true
            }
            _ => false,
        }
    }

    fn rename_master(&self, files: &mut [AudioFile]) -> Result<()> {
        let Some(master) = files.iter_mut().find(|f| f.is_master_recording) else {
            return Ok(());
        };

        let ext = master
            .file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("wav")
            .to_ascii_lowercase();
        let canonical_name = format!("{MASTER_CANONICAL_STEM}.{ext}");
        if master.file_name == canonical_name {
            return Ok(());
        }

        let canonical_path = master
            .file_path
            .parent()
            .map(|p| p.join(&canonical_name))
            .context("Master file has no parent directory")?;

        std::fs::rename(&master.file_path, &canonical_path).with_context(|| {
            format!(
                "Failed to rename master recording {:?} to {:?}",
                master.file_path, canonical_path
            )
        })?;

        info!("Renamed master recording to {:?}", canonical_path);
        master.file_name = canonical_name;
        master.file_path = canonical_path;
        Ok(())
    }
}

fn file_stem_lower(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}
