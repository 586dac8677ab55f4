//! FFmpeg-based audio transcoding.
//!
//! Converts raw tracks to the canonical compressed format (mono MP3 at a
//! speech-friendly bitrate). FFmpeg streams the file itself, so memory use
//! is bounded regardless of input size; its `-progress pipe:1` output gives
//! naturally rate-bounded progress without per-byte callbacks.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::pipeline::ProgressCallback;

/// Extension of converted output files.
pub const TARGET_EXTENSION: &str = "mp3";

/// Transcodes one file to the canonical compressed format.
#[async_trait]
pub trait AudioConverter: Send + Sync {
    /// Convert `input` in place (same folder, `.mp3` extension), reporting
    /// percentage progress. Returns the path of the converted file.
    async fn convert(&self, input: &Path, progress: &ProgressCallback) -> Result<PathBuf>;
}

/// Check if FFmpeg is installed and reachable.
pub fn check_ffmpeg_available() -> bool {
    which::which("ffmpeg").is_ok()
}

pub struct FfmpegConverter {
    bitrate_kbps: u32,
}

impl FfmpegConverter {
    pub fn new(bitrate_kbps: u32) -> Result<Self> {
        if !check_ffmpeg_available() {
            bail!(
                "FFmpeg is required to convert recordings but was not found.\n\
                 Install FFmpeg:\n\
                 - macOS: brew install ffmpeg\n\
                 - Ubuntu/Debian: sudo apt install ffmpeg\n\
                 - Arch: sudo pacman -S ffmpeg"
            );
        }
        Ok(Self { bitrate_kbps })
    }

    /// Source duration in seconds via ffprobe, for percentage math.
    async fn probe_duration_secs(&self, input: &Path) -> Result<f64> {
        let output = Command::new("ffprobe")
            .args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "csv=p=0"])
            .arg(input)
            .output()
            .await
            .context("Failed to run ffprobe")?;

        if !output.status.success() {
            bail!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .context("Failed to parse ffprobe duration")
    }
}

#[async_trait]
impl AudioConverter for FfmpegConverter {
    async fn convert(&self, input: &Path, progress: &ProgressCallback) -> Result<PathBuf> {
        let output_path = input.with_extension(TARGET_EXTENSION);
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "track".to_string());

        // Without a duration we still convert, just without percentages.
        let duration_secs = match self.probe_duration_secs(input).await {
            Ok(d) if d > 0.0 => Some(d),
            Ok(_) => None,
            Err(e) => {
                warn!("Could not probe duration of {:?}: {}", input, e);
                None
            }
        };

        info!("Converting {:?} to {:?}", input, output_path);
        progress(&format!("Converting {file_name}"), 0);

        let mut child = Command::new("ffmpeg")
            .args(["-i"])
            .arg(input)
            .args(["-vn"])
            .args(["-codec:a", "libmp3lame"])
            .args(["-b:a", &format!("{}k", self.bitrate_kbps)])
            .args(["-ac", "1"])
            .args(["-progress", "pipe:1"])
            .args(["-nostats", "-y"])
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn FFmpeg")?;

        let stdout = child
            .stdout
            .take()
            .context("FFmpeg stdout was not captured")?;
        let stderr = child
            .stderr
            .take()
            .context("FFmpeg stderr was not captured")?;

        // Drain stderr concurrently; if the pipe fills, FFmpeg blocks and
        // the progress loop below would never see EOF.
        let stderr_task = tokio::spawn(async move {
            let mut stderr = stderr;
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut last_reported: u8 = 0;

        while let Some(line) = lines.next_line().await.context("Failed to read FFmpeg progress")? {
            let (Some(duration), Some(value)) = (duration_secs, line.strip_prefix("out_time_ms="))
            else {
                continue;
            };
            // out_time_ms is microseconds despite the name.
            let Ok(micros) = value.trim().parse::<i64>() else {
                continue;
            };
            let done_secs = micros.max(0) as f64 / 1_000_000.0;
            let percent = ((done_secs / duration) * 100.0).min(99.0) as u8;
            if percent > last_reported {
                last_reported = percent;
                debug!("Converting {}: {}%", file_name, percent);
                progress(&format!("Converting {file_name}"), percent);
            }
        }

        let stderr_buf = stderr_task.await.unwrap_or_default();

        let status = child.wait().await.context("Failed to wait for FFmpeg")?;
        if !status.success() {
            // Leave no half-written output behind.
            let _ = std::fs::remove_file(&output_path);
            let detail = stderr_buf
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("unknown FFmpeg error");
            bail!("FFmpeg conversion failed: {}", detail.trim());
        }

        if !output_path.exists() {
            bail!("FFmpeg did not produce an output file");
        }

        progress(&format!("Converted {file_name}"), 100);
        info!("Conversion complete: {:?}", output_path);
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_ffmpeg_available_does_not_panic() {
        let available = check_ffmpeg_available();
        println!("FFmpeg available: {}", available);
    }

    #[tokio::test]
    async fn test_invalid_input_fails_with_stderr_detail() {
        if !check_ffmpeg_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("garbage.wav");
        std::fs::write(&input, vec![0x41u8; 4096]).unwrap();

        let converter = FfmpegConverter::new(96).unwrap();
        let progress = crate::pipeline::noop_progress();
        let err = converter.convert(&input, &progress).await.unwrap_err();

        // FFmpeg's own diagnostics surface in the error, and no
        // half-written output is left behind.
        assert!(format!("{err:#}").contains("FFmpeg"));
        assert!(!input.with_extension("mp3").exists());
    }

    #[test]
    fn test_target_extension() {
        assert_eq!(Path::new("/tmp/MIC1.WAV").with_extension(TARGET_EXTENSION)
            .file_name()
            .and_then(|n| n.to_str()),
            Some("MIC1.mp3"));
    }
}
