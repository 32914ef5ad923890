//! Memory backend trait for memsearch.
//!
//! This module defines the capability contract every provider implements:
//! the built-in lexical index, the subprocess adapter, and the fallback
//! decorator that wraps them. Callers hold an `Arc<dyn MemoryBackend>` and
//! never need to know which of these they are talking to.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::Result;

/// Default path reported for a hit when the provider does not name one.
pub const DEFAULT_MEMORY_PATH: &str = "MEMORY.md";

/// Trait for memory search providers.
///
/// All providers must be thread-safe; handles are shared across tasks.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Search memory for `query`.
    ///
    /// Results are not guaranteed to be sorted by the underlying provider;
    /// implementations normalize them before returning. `opts.session_key`
    /// must reach the underlying implementation unchanged.
    async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>>;

    /// Read a memory file (or a line window of it) relative to the workspace.
    async fn read_file(&self, request: &ReadFileRequest) -> Result<ReadFileResult>;

    /// Report provider health and identity.
    ///
    /// Must not perform I/O or mutate state.
    fn status(&self) -> BackendStatus;

    /// Whether `sync` does anything for this provider.
    fn supports_sync(&self) -> bool {
        false
    }

    /// Bring the provider's index up to date.
    ///
    /// Default implementation is a no-op; unsupported is not an error.
    async fn sync(&self, _request: &SyncRequest) -> Result<()> {
        Ok(())
    }

    /// Check whether the provider can currently produce embeddings.
    async fn probe_embedding_availability(&self) -> EmbeddingProbe;

    /// Check whether vector search is available.
    async fn probe_vector_availability(&self) -> bool;

    /// Release provider resources. Must be idempotent.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Get the provider name for logging.
    fn name(&self) -> &'static str;
}

/// Provider kinds the selector can attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Built-in lexical index over the workspace's markdown memory files.
    Builtin,
    /// External provider reached through the subprocess adapter protocol.
    Subprocess,
}

impl ProviderKind {
    /// Get the provider kind as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::Subprocess => "subprocess",
        }
    }

    /// Parse a provider kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "builtin" | "built-in" | "index" => Some(Self::Builtin),
            "subprocess" | "external" | "command" => Some(Self::Subprocess),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Options for a search call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    /// Maximum number of hits to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    /// Minimum score for a hit to be returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    /// Conversation-scoped context key, passed through verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

impl SearchOptions {
    /// Create options with no limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of results.
    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Set the minimum score.
    pub fn min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Set the session key.
    pub fn session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    /// Apply the score floor, ordering, and result limit to raw hits.
    pub fn apply(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        if let Some(min) = self.min_score {
            results.retain(|r| r.score >= min);
        }
        sort_by_score(&mut results);
        if let Some(limit) = self.max_results {
            results.truncate(limit);
        }
        results
    }
}

/// Where a hit came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Long-term memory files.
    #[default]
    Memory,
    /// Session transcripts.
    Sessions,
}

/// A normalized search hit, regardless of which provider produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Workspace-relative path of the matching file.
    pub path: String,
    /// First line of the hit (1-based).
    pub start_line: usize,
    /// Last line of the hit (1-based, inclusive).
    pub end_line: usize,
    /// Relevance score, higher is better.
    pub score: f64,
    /// Matching text excerpt.
    pub snippet: String,
    /// Which corpus the hit belongs to.
    pub source: ResultSource,
}

impl SearchResult {
    /// Create a memory hit.
    pub fn new(
        path: impl Into<String>,
        start_line: usize,
        end_line: usize,
        score: f64,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            start_line,
            end_line,
            score,
            snippet: snippet.into(),
            source: ResultSource::Memory,
        }
    }
}

/// Sort hits by descending score. Stable; NaN scores sort last.
pub fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
        (false, false) => b.score.total_cmp(&a.score),
        (a_nan, b_nan) => a_nan.cmp(&b_nan),
    });
}

/// Request to read a memory file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileRequest {
    /// Path relative to the workspace.
    pub rel_path: String,
    /// First line to return (1-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<usize>,
    /// Number of lines to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<usize>,
}

impl ReadFileRequest {
    /// Read a whole file.
    pub fn new(rel_path: impl Into<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
            from: None,
            lines: None,
        }
    }

    /// Restrict to a line window.
    pub fn window(mut self, from: usize, lines: usize) -> Self {
        self.from = Some(from);
        self.lines = Some(lines);
        self
    }
}

/// Contents returned by `read_file`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadFileResult {
    /// The requested text.
    pub text: String,
    /// The path that was read.
    pub path: String,
}

/// Progress report emitted while syncing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Units of work completed.
    pub completed: usize,
    /// Total units of work.
    pub total: usize,
    /// What is being worked on.
    pub label: Option<String>,
}

/// Callback receiving sync progress.
pub type ProgressFn = Arc<dyn Fn(SyncProgress) + Send + Sync>;

/// Request to sync a provider's index.
#[derive(Clone, Default)]
pub struct SyncRequest {
    /// Why the sync was requested (e.g. "session-start", "cli").
    pub reason: Option<String>,
    /// Rebuild even if nothing looks dirty.
    pub force: bool,
    /// Optional progress callback.
    pub progress: Option<ProgressFn>,
}

impl SyncRequest {
    /// Create a sync request with a reason.
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Force a full rebuild.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Attach a progress callback.
    pub fn progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Report progress if a callback is attached.
    pub fn report(&self, completed: usize, total: usize, label: Option<String>) {
        if let Some(progress) = &self.progress {
            progress(SyncProgress {
                completed,
                total,
                label,
            });
        }
    }
}

impl fmt::Debug for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRequest")
            .field("reason", &self.reason)
            .field("force", &self.force)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Result of probing embedding availability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingProbe {
    /// Whether embeddings can be produced.
    pub ok: bool,
    /// Why not, when `ok` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmbeddingProbe {
    /// Embeddings are available.
    pub fn available() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    /// Embeddings are unavailable for `reason`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

/// Annotation attached to a degraded provider's status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FallbackNote {
    /// The provider kind that failed.
    pub from: ProviderKind,
    /// The primary's failure message.
    pub reason: String,
}

/// Provider-reported health and identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    /// Provider kind serving requests.
    pub backend: ProviderKind,
    /// Provider identity (e.g. command name or "lexical").
    pub provider: String,
    /// Embedding model, when the provider has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Number of indexed files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<usize>,
    /// Number of indexed chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    /// Whether the index is known to be stale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
    /// Workspace the provider serves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,
    /// Corpora the provider searches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<ResultSource>,
    /// Whether vector search is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_available: Option<bool>,
    /// Present when a primary provider failed and requests go to a fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackNote>,
    /// Provider-specific fields.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom: Map<String, Value>,
}

impl BackendStatus {
    /// Create a minimal status for a provider.
    pub fn new(backend: ProviderKind, provider: impl Into<String>) -> Self {
        Self {
            backend,
            provider: provider.into(),
            model: None,
            files: None,
            chunks: None,
            dirty: None,
            workspace_dir: None,
            sources: vec![ResultSource::Memory],
            vector_available: None,
            fallback: None,
            custom: Map::new(),
        }
    }

    /// Attach the degraded-provider annotation.
    ///
    /// Existing custom fields are kept; only `custom.fallback` is replaced.
    pub fn with_fallback(mut self, from: ProviderKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.custom.insert(
            "fallback".to_string(),
            json!({ "disabled": true, "reason": reason }),
        );
        self.fallback = Some(FallbackNote { from, reason });
        self
    }
}
