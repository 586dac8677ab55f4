//! Pipeline core: the per-file state machine and the workflow orchestrator.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub mod orchestrator;
pub mod state;

pub use orchestrator::{aggregate_progress, reanalyze_from_cached, Orchestrator};
pub use state::{PipelineStage, ProcessingStatus, TransitionError};

/// Progress callback contract exposed to callers: `(message, percent)`.
/// Invoked at stage boundaries and at bounded intervals during long stages.
pub type ProgressCallback = Arc<dyn Fn(&str, u8) + Send + Sync>;

pub fn noop_progress() -> ProgressCallback {
    Arc::new(|_, _| {})
}

/// Caller-facing cancellation handle. Marking a file cancelled does not
/// abort an in-flight provider call; the orchestrator discards that file's
/// result at the next stage boundary and marks it failed.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    cancelled: Arc<Mutex<HashSet<Uuid>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, file_id: Uuid) {
        if let Ok(mut set) = self.cancelled.lock() {
            set.insert(file_id);
        }
    }

    pub fn is_cancelled(&self, file_id: Uuid) -> bool {
        self.cancelled
            .lock()
            .map(|set| set.contains(&file_id))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut set) = self.cancelled.lock() {
            set.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_registry() {
        let registry = CancellationRegistry::new();
        let id = Uuid::new_v4();
        assert!(!registry.is_cancelled(id));

        registry.request(id);
        assert!(registry.is_cancelled(id));
        assert!(!registry.is_cancelled(Uuid::new_v4()));

        registry.clear();
        assert!(!registry.is_cancelled(id));
    }
}
