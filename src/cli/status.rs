//! Status command for memsearch.
//!
//! Reports the selected backend's status and capability probes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backends::{BackendStatus, EmbeddingProbe, MemoryBackend};

/// Options for the status command.
#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the status command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    /// Whether status was collected.
    pub success: bool,
    /// Backend status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BackendStatus>,
    /// Embedding probe result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingProbe>,
    /// Vector probe result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<bool>,
    /// Error message if no backend is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusOutput {
    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            embedding: None,
            vector: None,
            error: Some(error.into()),
        }
    }
}

/// The status command implementation.
pub struct StatusCommand {
    backend: Arc<dyn MemoryBackend>,
}

impl StatusCommand {
    /// Create a new status command.
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    /// Collect status and probes.
    pub async fn run(&self, _options: &StatusOptions) -> StatusOutput {
        let embedding = self.backend.probe_embedding_availability().await;
        let vector = self.backend.probe_vector_availability().await;

        StatusOutput {
            success: true,
            status: Some(self.backend.status()),
            embedding: Some(embedding),
            vector: Some(vector),
            error: None,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &StatusOutput, options: &StatusOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &StatusOutput) -> String {
        let Some(status) = output.status.as_ref().filter(|_| output.success) else {
            return format!(
                "Status failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        };

        let mut lines = vec![format!("Backend: {} ({})", status.backend, status.provider)];

        if let Some(dir) = &status.workspace_dir {
            lines.push(format!("Workspace: {}", dir.display()));
        }
        if let Some(model) = &status.model {
            lines.push(format!("Model: {}", model));
        }
        if let (Some(files), Some(chunks)) = (status.files, status.chunks) {
            lines.push(format!("Indexed: {} file(s), {} chunk(s)", files, chunks));
        }
        if status.dirty == Some(true) {
            lines.push("Index is stale; run `memsearch sync`".to_string());
        }

        if let Some(probe) = &output.embedding {
            match (probe.ok, &probe.error) {
                (true, _) => lines.push("Embeddings: available".to_string()),
                (false, Some(reason)) => lines.push(format!("Embeddings: unavailable ({})", reason)),
                (false, None) => lines.push("Embeddings: unavailable".to_string()),
            }
        }
        if let Some(vector) = output.vector {
            lines.push(format!(
                "Vector search: {}",
                if vector { "available" } else { "unavailable" }
            ));
        }

        if let Some(note) = &status.fallback {
            lines.push(String::new());
            lines.push(format!("Fallback active: {} failed: {}", note.from, note.reason));
        }

        lines.join("\n") + "\n"
    }
}
