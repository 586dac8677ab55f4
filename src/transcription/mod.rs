//! Transcription provider abstraction.
//!
//! The pipeline talks to the provider through `TranscriptionClient` only, so
//! tests run against mocks and the purge workflow works on any account that
//! supports paged listing and deletion.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

mod gladia;

pub use gladia::GladiaClient;

/// One stored transcription on the provider account, as seen by the paged
/// listing endpoint. Transient; never persisted locally.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionListItem {
    pub remote_id: String,
    pub file_name: Option<String>,
    pub created_at: Option<String>,
}

#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// False when credentials are missing; callers fail fast before any
    /// work is queued.
    fn is_configured(&self) -> bool;

    /// Stream a converted file to the provider. Returns the remote id.
    async fn upload(&self, path: &Path, mime_type: &str) -> Result<String>;

    /// Poll until the transcript is ready or the bounded timeout elapses.
    /// A timeout is an error the caller treats as retryable.
    async fn retrieve(&self, remote_id: &str) -> Result<String>;

    /// One page of the account-wide inventory. A page shorter than
    /// `page_size` is the end-of-list sentinel.
    async fn list_all(&self, page_size: usize, offset: usize)
        -> Result<Vec<TranscriptionListItem>>;

    /// Delete one stored transcription. `Ok(false)` means the provider
    /// refused (e.g. already gone); errors are transport failures.
    async fn delete(&self, remote_id: &str) -> Result<bool>;
}
