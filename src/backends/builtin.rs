//! Built-in lexical memory index.
//!
//! Indexes `MEMORY.md` and every `memory/**/*.md` file under the workspace
//! into fixed-size line chunks and scores chunks by query-term coverage.
//! It needs no external tools, which makes it the fallback for every
//! subprocess provider.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::backends::traits::{
    BackendStatus, EmbeddingProbe, MemoryBackend, ProviderKind, ReadFileRequest, ReadFileResult,
    SearchOptions, SearchResult, SyncRequest,
};
use crate::error::{MemoryError, Result};
use crate::util::{is_contained_relative, read_to_string_limited, truncate_chars};

/// Root memory files, checked in order.
const ROOT_MEMORY_FILES: &[&str] = &["MEMORY.md", "memory.md"];

/// Directory holding dated/topic memory files.
const MEMORY_DIR: &str = "memory";

/// Default chunk size in lines.
pub const DEFAULT_CHUNK_LINES: usize = 12;

/// Default snippet length in characters.
pub const DEFAULT_SNIPPET_CHARS: usize = 700;

/// Resolved settings for the built-in index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltinConfig {
    /// Workspace whose memory files are indexed.
    pub workspace_dir: PathBuf,
    /// Lines per chunk.
    pub chunk_lines: usize,
    /// Maximum snippet length.
    pub snippet_chars: usize,
}

impl BuiltinConfig {
    /// Create a config with default chunking.
    pub fn new(workspace_dir: impl AsRef<Path>) -> Self {
        Self {
            workspace_dir: workspace_dir.as_ref().to_path_buf(),
            chunk_lines: DEFAULT_CHUNK_LINES,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }
}

/// A contiguous run of lines from one memory file.
#[derive(Debug, Clone)]
struct Chunk {
    path: String,
    start_line: usize,
    end_line: usize,
    text: String,
    lowered: String,
}

#[derive(Debug, Default)]
struct IndexSnapshot {
    files: usize,
    chunks: Vec<Chunk>,
    indexed_at: Option<DateTime<Utc>>,
    dirty: bool,
}

/// Built-in memory backend.
#[derive(Debug)]
pub struct BuiltinBackend {
    config: BuiltinConfig,
    index: RwLock<IndexSnapshot>,
}

impl BuiltinBackend {
    /// Build the backend and its initial index.
    pub async fn create(config: BuiltinConfig) -> Result<Self> {
        let snapshot = build_index_blocking(config.clone(), None).await?;
        Ok(Self {
            config,
            index: RwLock::new(snapshot),
        })
    }

    /// Get the resolved config.
    pub fn config(&self) -> &BuiltinConfig {
        &self.config
    }

    fn replace_index(&self, snapshot: IndexSnapshot) {
        match self.index.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    fn mark_dirty(&self) {
        match self.index.write() {
            Ok(mut guard) => guard.dirty = true,
            Err(poisoned) => poisoned.into_inner().dirty = true,
        }
    }
}

#[async_trait]
impl MemoryBackend for BuiltinBackend {
    async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let hits = {
            let index = self
                .index
                .read()
                .map_err(|_| MemoryError::backend("builtin index lock poisoned"))?;
            index
                .chunks
                .iter()
                .filter_map(|chunk| {
                    let score = coverage(&chunk.lowered, &terms);
                    (score > 0.0).then(|| {
                        SearchResult::new(
                            chunk.path.clone(),
                            chunk.start_line,
                            chunk.end_line,
                            score,
                            truncate_chars(&chunk.text, self.config.snippet_chars),
                        )
                    })
                })
                .collect::<Vec<_>>()
        };

        Ok(opts.apply(hits))
    }

    async fn read_file(&self, request: &ReadFileRequest) -> Result<ReadFileResult> {
        if !is_memory_path(&request.rel_path) {
            return Err(MemoryError::backend(format!(
                "not a memory file: {}",
                request.rel_path
            )));
        }

        let path = self.config.workspace_dir.join(&request.rel_path);
        let content = tokio::task::spawn_blocking(move || read_to_string_limited(&path))
            .await
            .map_err(|e| MemoryError::backend(format!("read task failed: {}", e)))??;

        let text = match (request.from, request.lines) {
            (None, None) => content,
            (from, lines) => {
                let skip = from.unwrap_or(1).saturating_sub(1);
                let take = lines.unwrap_or(usize::MAX);
                content
                    .lines()
                    .skip(skip)
                    .take(take)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        Ok(ReadFileResult {
            text,
            path: request.rel_path.clone(),
        })
    }

    fn status(&self) -> BackendStatus {
        let mut status = BackendStatus::new(ProviderKind::Builtin, "lexical");
        status.workspace_dir = Some(self.config.workspace_dir.clone());
        status.vector_available = Some(false);

        if let Ok(index) = self.index.read() {
            status.files = Some(index.files);
            status.chunks = Some(index.chunks.len());
            status.dirty = Some(index.dirty);
            if let Some(at) = index.indexed_at {
                status
                    .custom
                    .insert("indexedAt".to_string(), json!(at.to_rfc3339()));
            }
        }
        status
    }

    fn supports_sync(&self) -> bool {
        true
    }

    async fn sync(&self, request: &SyncRequest) -> Result<()> {
        debug!(
            "rebuilding builtin index for {} (reason: {})",
            self.config.workspace_dir.display(),
            request.reason.as_deref().unwrap_or("unspecified")
        );
        match build_index_blocking(self.config.clone(), Some(request.clone())).await {
            Ok(snapshot) => {
                self.replace_index(snapshot);
                Ok(())
            }
            Err(err) => {
                self.mark_dirty();
                Err(err)
            }
        }
    }

    async fn probe_embedding_availability(&self) -> EmbeddingProbe {
        EmbeddingProbe::unavailable("lexical index has no embedding provider")
    }

    async fn probe_vector_availability(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "builtin"
    }
}

async fn build_index_blocking(
    config: BuiltinConfig,
    request: Option<SyncRequest>,
) -> Result<IndexSnapshot> {
    tokio::task::spawn_blocking(move || build_index(&config, request.as_ref()))
        .await
        .map_err(|e| MemoryError::backend(format!("index task failed: {}", e)))?
}

/// Scan the workspace and chunk every memory file.
fn build_index(config: &BuiltinConfig, request: Option<&SyncRequest>) -> Result<IndexSnapshot> {
    if !config.workspace_dir.is_dir() {
        return Err(MemoryError::backend(format!(
            "workspace not found: {}",
            config.workspace_dir.display()
        )));
    }

    let files = memory_files(&config.workspace_dir);
    let total = files.len();
    let mut chunks = Vec::new();

    for (i, rel_path) in files.iter().enumerate() {
        let path = config.workspace_dir.join(rel_path);
        match read_to_string_limited(&path) {
            Ok(content) => chunks.extend(chunk_file(rel_path, &content, config.chunk_lines)),
            Err(err) => warn!("skipping memory file {}: {}", rel_path, err),
        }
        if let Some(request) = request {
            request.report(i + 1, total, Some(rel_path.clone()));
        }
    }

    Ok(IndexSnapshot {
        files: total,
        chunks,
        indexed_at: Some(Utc::now()),
        dirty: false,
    })
}

/// List memory files as workspace-relative, `/`-separated paths, sorted.
fn memory_files(workspace: &Path) -> Vec<String> {
    let mut files: Vec<String> = ROOT_MEMORY_FILES
        .iter()
        .filter(|name| workspace.join(name).is_file())
        .map(|name| name.to_string())
        .collect();

    // Case-insensitive filesystems report both root names for one file.
    if files.len() == 2 {
        if let (Ok(a), Ok(b)) = (
            fs::canonicalize(workspace.join(ROOT_MEMORY_FILES[0])),
            fs::canonicalize(workspace.join(ROOT_MEMORY_FILES[1])),
        ) {
            if a == b {
                files.truncate(1);
            }
        }
    }

    let mut nested = Vec::new();
    collect_markdown(&workspace.join(MEMORY_DIR), MEMORY_DIR, &mut nested);
    nested.sort();
    files.extend(nested);
    files
}

fn collect_markdown(dir: &Path, prefix: &str, out: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let rel = format!("{}/{}", prefix, name);
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            collect_markdown(&entry.path(), &rel, out);
        } else if file_type.is_file() && name.ends_with(".md") {
            out.push(rel);
        }
    }
}

fn chunk_file(rel_path: &str, content: &str, chunk_lines: usize) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    lines
        .chunks(chunk_lines.max(1))
        .enumerate()
        .filter_map(|(i, window)| {
            let text = window.join("\n");
            if text.trim().is_empty() {
                return None;
            }
            let start_line = i * chunk_lines.max(1) + 1;
            Some(Chunk {
                path: rel_path.to_string(),
                start_line,
                end_line: start_line + window.len() - 1,
                lowered: text.to_lowercase(),
                text,
            })
        })
        .collect()
}

/// Lowercased, deduplicated query terms.
fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

/// Fraction of terms present in the chunk.
fn coverage(lowered: &str, terms: &[String]) -> f64 {
    let matched = terms.iter().filter(|t| lowered.contains(t.as_str())).count();
    matched as f64 / terms.len() as f64
}

fn is_memory_path(rel_path: &str) -> bool {
    if !is_contained_relative(rel_path) {
        return false;
    }
    let normalized = rel_path.trim_start_matches("./");
    ROOT_MEMORY_FILES.contains(&normalized)
        || (normalized.starts_with("memory/") && normalized.ends_with(".md"))
}
