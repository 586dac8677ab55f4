//! Guarded purge of the transcription provider account.
//!
//! A separate five-phase machine from the per-file pipeline, because it
//! operates on the entire remote account rather than one session. The
//! inventory is fully enumerated before any deletion, progression into the
//! delete loop requires a typed confirmation phrase, and every loop outcome
//! is captured in the result so partial progress is never lost.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::transcription::{TranscriptionClient, TranscriptionListItem};

/// Exact phrase the caller must supply to unlock the delete loop.
pub const CONFIRMATION_PHRASE: &str = "DELETE ALL TRANSCRIPTIONS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgePhase {
    Initial,
    Checking,
    Confirmation,
    Purging,
    Complete,
}

impl PurgePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Checking => "checking",
            Self::Confirmation => "confirmation",
            Self::Purging => "purging",
            Self::Complete => "complete",
        }
    }
}

/// Accounting for one purge run. For a run without a critical error,
/// `total_deleted + total_failed == total_found` (minus items skipped by an
/// aborting callback).
#[derive(Debug, Clone, Default)]
pub struct PurgeResult {
    pub total_found: usize,
    pub total_deleted: usize,
    pub total_failed: usize,
    pub failed_ids: Vec<String>,
    /// Provider-level error that stopped the loop. Deletions completed
    /// before it are still counted above.
    pub critical_error: Option<String>,
}

pub struct PurgeWorkflow {
    client: Arc<dyn TranscriptionClient>,
    phase: PurgePhase,
    inventory: Vec<TranscriptionListItem>,
    page_size: usize,
}

impl PurgeWorkflow {
    pub fn new(client: Arc<dyn TranscriptionClient>, page_size: usize) -> Self {
        Self {
            client,
            phase: PurgePhase::Initial,
            inventory: Vec::new(),
            page_size: page_size.max(1),
        }
    }

    pub fn phase(&self) -> PurgePhase {
        self.phase
    }

    pub fn inventory(&self) -> &[TranscriptionListItem] {
        &self.inventory
    }

    /// Enumerate the whole remote account, paging until a short page.
    /// Moves `Initial -> Checking -> Confirmation` and returns the count.
    /// An unconfigured provider aborts back to `Initial`.
    pub async fn check(&mut self) -> Result<usize> {
        if self.phase != PurgePhase::Initial {
            bail!("Purge check already performed (phase: {})", self.phase.as_str());
        }
        if !self.client.is_configured() {
            self.phase = PurgePhase::Initial;
            bail!("Transcription provider is not configured");
        }

        self.phase = PurgePhase::Checking;
        self.inventory.clear();

        let mut offset = 0;
        loop {
            let page = match self.client.list_all(self.page_size, offset).await {
                Ok(page) => page,
                Err(e) => {
                    self.phase = PurgePhase::Initial;
                    self.inventory.clear();
                    return Err(e.context("Failed to enumerate remote transcriptions"));
                }
            };
            let page_len = page.len();
            self.inventory.extend(page);
            if page_len < self.page_size {
                break;
            }
            offset += page_len;
        }

        info!("Purge check found {} remote transcriptions", self.inventory.len());
        self.phase = PurgePhase::Confirmation;
        Ok(self.inventory.len())
    }

    /// Unlock the delete loop. The phrase must match exactly; a mismatch
    /// leaves the workflow in `Confirmation`.
    pub fn confirm(&mut self, phrase: &str) -> Result<()> {
        if self.phase != PurgePhase::Confirmation {
            bail!("Nothing to confirm (phase: {})", self.phase.as_str());
        }
        if phrase != CONFIRMATION_PHRASE {
            bail!("Confirmation phrase did not match; type '{CONFIRMATION_PHRASE}' exactly");
        }
        self.phase = PurgePhase::Purging;
        Ok(())
    }

    /// Delete the inventory one item at a time. The callback receives
    /// `(total, deleted_so_far)` after each item and may return `false` to
    /// abort the remaining deletions. Provider-level errors are captured as
    /// a critical error on the result, never propagated.
    pub async fn purge<F>(&mut self, mut progress: F) -> Result<PurgeResult>
    where
        F: FnMut(usize, usize) -> bool,
    {
        if self.phase != PurgePhase::Purging {
            bail!("Purge not confirmed (phase: {})", self.phase.as_str());
        }

        let mut result = PurgeResult {
            total_found: self.inventory.len(),
            ..Default::default()
        };

        for item in &self.inventory {
            match self.client.delete(&item.remote_id).await {
                Ok(true) => result.total_deleted += 1,
                Ok(false) => {
                    warn!("Provider refused to delete {}", item.remote_id);
                    result.total_failed += 1;
                    result.failed_ids.push(item.remote_id.clone());
                }
                Err(e) => {
                    error!("Purge stopped by provider error: {:#}", e);
                    result.critical_error = Some(format!("{e:#}"));
                    break;
                }
            }

            if !progress(result.total_found, result.total_deleted) {
                info!(
                    "Purge aborted by caller after {} of {} deletions",
                    result.total_deleted, result.total_found
                );
                break;
            }
        }

        info!(
            "Purge complete: {} found, {} deleted, {} failed",
            result.total_found, result.total_deleted, result.total_failed
        );
        self.phase = PurgePhase::Complete;
        self.inventory.clear();
        Ok(result)
    }
}
