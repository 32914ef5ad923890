//! Sync command for memsearch.
//!
//! Asks the selected backend to refresh its index.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::backends::{MemoryBackend, SyncProgress, SyncRequest};
use crate::util::lock;

/// Options for the sync command.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Rebuild even if the backend considers itself fresh.
    pub force: bool,
    /// Reason recorded by the backend.
    pub reason: Option<String>,
}

/// Output format for the sync command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutput {
    /// Whether the sync succeeded (an unsupported sync counts as success).
    pub success: bool,
    /// Whether the backend supports sync.
    pub supported: bool,
    /// Progress updates reported by the backend.
    pub progress: Vec<SyncProgress>,
    /// Error message if sync failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The sync command implementation.
pub struct SyncCommand {
    backend: Arc<dyn MemoryBackend>,
}

impl SyncCommand {
    /// Create a new sync command.
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    /// Run the sync.
    pub async fn run(&self, options: &SyncOptions) -> SyncOutput {
        if !self.backend.supports_sync() {
            return SyncOutput {
                success: true,
                supported: false,
                progress: Vec::new(),
                error: None,
            };
        }

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let request = SyncRequest::with_reason(options.reason.as_deref().unwrap_or("cli"))
            .force(options.force)
            .progress(Arc::new(move |update: SyncProgress| {
                tracing::debug!(
                    "sync progress {}/{} {}",
                    update.completed,
                    update.total,
                    update.label.as_deref().unwrap_or("")
                );
                lock(&sink).push(update);
            }));

        let result = self.backend.sync(&request).await;
        let progress = std::mem::take(&mut *lock(&events));

        match result {
            Ok(()) => SyncOutput {
                success: true,
                supported: true,
                progress,
                error: None,
            },
            Err(e) => SyncOutput {
                success: false,
                supported: true,
                progress,
                error: Some(e.to_string()),
            },
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &SyncOutput, options: &SyncOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        if !output.success {
            return format!(
                "Sync failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }
        if !output.supported {
            return "Backend does not support sync; nothing to do.\n".to_string();
        }

        match output.progress.last() {
            Some(last) => format!("Synced {}/{} item(s).\n", last.completed, last.total),
            None => "Synced.\n".to_string(),
        }
    }
}
