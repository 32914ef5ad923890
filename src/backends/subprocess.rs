//! Subprocess adapter for external memory providers.
//!
//! Each capability call becomes exactly one invocation of the provider's
//! command:
//! - argv is `command [args...] <operation>` (`health`, `search`, `fetch`, `flush`)
//! - stdin receives one JSON object (the payload plus `workspaceDir`), then EOF
//! - stdout is read until the process exits and parsed as
//!   `{ "ok"?, "data"?, "status"?, "error"? }`
//!
//! Construction runs `health` first. A provider that cannot be spawned, fails,
//! or reports `backend_available: false` declines by producing no handle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::backends::traits::{
    BackendStatus, EmbeddingProbe, MemoryBackend, ProviderKind, ReadFileRequest, ReadFileResult,
    SearchOptions, SearchResult, SyncRequest, DEFAULT_MEMORY_PATH,
};
use crate::error::{MemoryError, Result};

/// Default wall-clock budget for one adapter invocation.
pub const DEFAULT_TIMEOUT_MS: u64 = 4_000;

/// Adapter operations, passed as the final positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Construction-time availability check.
    Health,
    /// Memory search.
    Search,
    /// File read.
    Fetch,
    /// Index flush/sync.
    Flush,
}

impl Operation {
    /// Get the operation name as sent on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Search => "search",
            Self::Fetch => "fetch",
            Self::Flush => "flush",
        }
    }
}

/// Resolved settings for one subprocess provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubprocessConfig {
    /// Executable to spawn.
    pub command: String,
    /// Arguments placed before the operation name.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the child.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Per-invocation timeout in milliseconds.
    pub timeout_ms: u64,
    /// Working directory for the child, also sent as `workspaceDir`.
    pub workspace_dir: PathBuf,
}

impl SubprocessConfig {
    /// Create a config with default timeout and no extra args.
    pub fn new(command: impl Into<String>, workspace_dir: impl AsRef<Path>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            workspace_dir: workspace_dir.as_ref().to_path_buf(),
        }
    }

    /// Set the leading arguments.
    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the timeout.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Parsed adapter reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdapterResponse {
    /// In-band success flag.
    #[serde(default)]
    pub ok: Option<bool>,
    /// Operation result.
    #[serde(default)]
    pub data: Option<Value>,
    /// Provider status object (health).
    #[serde(default)]
    pub status: Option<Value>,
    /// In-band error description.
    #[serde(default)]
    pub error: Option<Value>,
}

/// Memory backend that talks to an external provider over the adapter protocol.
#[derive(Debug)]
pub struct SubprocessBackend {
    config: SubprocessConfig,
    /// Status object from the construction-time health check.
    health: Value,
    closed: AtomicBool,
}

impl SubprocessBackend {
    /// Health-check the provider and build a handle.
    ///
    /// Returns `None` when the provider declines or cannot be reached; callers
    /// should move on to the next provider.
    pub async fn create(config: SubprocessConfig) -> Option<Self> {
        match run_operation(&config, Operation::Health, Value::Null).await {
            Ok(response) => {
                let health = response.status.unwrap_or(Value::Null);
                if health.get("backend_available").and_then(Value::as_bool) == Some(false) {
                    debug!(
                        "memory adapter '{}' reports backend unavailable",
                        config.command
                    );
                    return None;
                }
                Some(Self {
                    config,
                    health,
                    closed: AtomicBool::new(false),
                })
            }
            Err(err) => {
                warn!(
                    "memory adapter '{}' failed health check: {}",
                    config.command, err
                );
                None
            }
        }
    }

    /// Get the resolved config.
    pub fn config(&self) -> &SubprocessConfig {
        &self.config
    }

    /// Provider identity: the command's file name.
    fn provider_name(&self) -> String {
        Path::new(&self.config.command)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.config.command)
            .to_string()
    }

    async fn invoke(&self, operation: Operation, payload: Value) -> Result<AdapterResponse> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MemoryError::backend(format!(
                "memory adapter '{}' is closed",
                self.config.command
            )));
        }
        run_operation(&self.config, operation, payload).await
    }
}

#[async_trait]
impl MemoryBackend for SubprocessBackend {
    async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let mut payload = match serde_json::to_value(opts)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        payload.insert("query".to_string(), Value::String(query.to_string()));

        let response = self
            .invoke(Operation::Search, Value::Object(payload))
            .await?;

        let hits = response
            .data
            .as_ref()
            .and_then(|d| d.get("results"))
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(map_hit).collect())
            .unwrap_or_default();

        Ok(opts.apply(hits))
    }

    async fn read_file(&self, request: &ReadFileRequest) -> Result<ReadFileResult> {
        let payload = serde_json::to_value(request)?;
        let response = self.invoke(Operation::Fetch, payload).await?;

        let lines: Vec<String> = response
            .data
            .as_ref()
            .and_then(|d| d.get("content"))
            .and_then(Value::as_array)
            .map(|content| content.iter().map(value_to_text).collect())
            .unwrap_or_default();

        Ok(ReadFileResult {
            text: lines.join("\n"),
            path: request.rel_path.clone(),
        })
    }

    fn status(&self) -> BackendStatus {
        let mut status = BackendStatus::new(ProviderKind::Subprocess, self.provider_name());
        status.workspace_dir = Some(self.config.workspace_dir.clone());
        status.vector_available = Some(true);
        status.model = self
            .health
            .get("model")
            .and_then(Value::as_str)
            .map(String::from);
        status
            .custom
            .insert("command".to_string(), json!(self.config.command));
        if !self.health.is_null() {
            status
                .custom
                .insert("health".to_string(), self.health.clone());
        }
        status
    }

    fn supports_sync(&self) -> bool {
        true
    }

    async fn sync(&self, request: &SyncRequest) -> Result<()> {
        let payload = json!({
            "reason": request.reason,
            "force": request.force,
        });
        self.invoke(Operation::Flush, payload).await?;
        request.report(1, 1, Some(Operation::Flush.as_str().to_string()));
        Ok(())
    }

    // Subprocess providers manage their own embeddings; both probes are
    // answered locally.
    async fn probe_embedding_availability(&self) -> EmbeddingProbe {
        EmbeddingProbe::available()
    }

    async fn probe_vector_availability(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "subprocess"
    }
}

/// Run one adapter invocation to completion.
///
/// The whole exchange shares one deadline. On expiry the in-flight future is
/// dropped, which kills the child (`kill_on_drop`), and no partial output is
/// used.
pub async fn run_operation(
    config: &SubprocessConfig,
    operation: Operation,
    payload: Value,
) -> Result<AdapterResponse> {
    let body = request_body(payload, &config.workspace_dir)?;
    let op = operation.as_str();

    let mut command = Command::new(&config.command);
    command
        .args(&config.args)
        .arg(op)
        .current_dir(&config.workspace_dir)
        .envs(&config.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = config.command.clone();
    let exchange = async move {
        let mut child = command.spawn().map_err(|e| {
            MemoryError::process(format!("failed to spawn '{}': {}", program, e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading closes the pipe early; its
            // exit status decides the outcome.
            if let Err(e) = stdin.write_all(&body).await {
                debug!("writing {} request to '{}': {}", op, program, e);
            } else if let Err(e) = stdin.shutdown().await {
                debug!("closing stdin of '{}': {}", program, e);
            }
        }

        child.wait_with_output().await.map_err(|e| {
            MemoryError::process(format!("failed waiting for '{}': {}", program, e))
        })
    };

    let output = tokio::time::timeout(Duration::from_millis(config.timeout_ms), exchange)
        .await
        .map_err(|_| MemoryError::timeout(op, config.timeout_ms))??;

    interpret_output(operation, output.status, &output.stdout, &output.stderr)
}

/// Merge `workspaceDir` into the payload object and encode it.
fn request_body(payload: Value, workspace_dir: &Path) -> Result<Vec<u8>> {
    let mut map = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(MemoryError::serde(format!(
                "adapter payload must be a JSON object, got {}",
                other
            )))
        }
    };
    map.insert(
        "workspaceDir".to_string(),
        Value::String(workspace_dir.display().to_string()),
    );
    Ok(serde_json::to_vec(&Value::Object(map))?)
}

/// Turn a finished process into a response or an error.
fn interpret_output(
    operation: Operation,
    status: ExitStatus,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<AdapterResponse> {
    let op = operation.as_str();

    if !status.success() {
        let stderr = String::from_utf8_lossy(stderr).trim().to_string();
        let message = if !stderr.is_empty() {
            stderr
        } else {
            match status.code() {
                Some(code) => format!("{} exited with code {}", op, code),
                None => format!("{} terminated by signal", op),
            }
        };
        return Err(MemoryError::process(message));
    }

    let stdout = String::from_utf8_lossy(stdout);
    let response: AdapterResponse = serde_json::from_str(stdout.trim())
        .map_err(|e| MemoryError::process(format!("invalid response from {}: {}", op, e)))?;

    if response.ok == Some(false) {
        let message = response
            .error
            .as_ref()
            .map(value_to_text)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("{} reported failure", op));
        return Err(MemoryError::process(message));
    }

    Ok(response)
}

/// Normalize one `results[]` entry.
///
/// The protocol carries no line ranges, so every hit spans line 1.
fn map_hit(entry: &Value) -> SearchResult {
    let path = ["id", "path"]
        .iter()
        .filter_map(|key| entry.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or(DEFAULT_MEMORY_PATH);

    let snippet = match entry.get("snippet") {
        None | Some(Value::Null) => String::new(),
        Some(other) => value_to_text(other),
    };

    SearchResult::new(path, 1, 1, coerce_score(entry.get("score")), snippet)
}

fn coerce_score(value: Option<&Value>) -> f64 {
    let score = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    };
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    /// Write a fake adapter script whose `case` arms are `cases`.
    ///
    /// The script stores each request body at `$ADAPTER_STATE/<op>.request.json`.
    fn fake_adapter(temp: &TempDir, cases: &str) -> SubprocessConfig {
        let script = temp.path().join("adapter.sh");
        let body = format!(
            "op=\"$1\"\ncat > \"$ADAPTER_STATE/$op.request.json\"\ncase \"$op\" in\n{}\n  *) echo \"unsupported operation: $op\" >&2; exit 2 ;;\nesac\n",
            cases
        );
        fs::write(&script, body).unwrap();

        SubprocessConfig::new("sh", temp.path())
            .args(vec![script.display().to_string()])
            .env("ADAPTER_STATE", temp.path().display().to_string())
            .timeout_ms(5_000)
    }

    const HEALTHY: &str =
        r#"  health) echo '{"ok":true,"status":{"backend_available":true,"model":"mini-embed"}}' ;;"#;

    fn last_request(temp: &TempDir, op: &str) -> Value {
        let raw = fs::read_to_string(temp.path().join(format!("{}.request.json", op))).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_create_declines_when_backend_unavailable() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(
            &temp,
            r#"  health) echo '{"ok":true,"status":{"backend_available":false}}' ;;"#,
        );

        assert!(SubprocessBackend::create(config).await.is_none());
    }

    #[tokio::test]
    async fn test_create_declines_when_command_missing() {
        let temp = TempDir::new().unwrap();
        let config = SubprocessConfig::new("/nonexistent/memsearch-adapter-test", temp.path());

        assert!(SubprocessBackend::create(config).await.is_none());
    }

    #[tokio::test]
    async fn test_create_declines_on_failed_health() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(&temp, "  health) echo 'index missing' >&2; exit 3 ;;");

        assert!(SubprocessBackend::create(config).await.is_none());
    }

    #[tokio::test]
    async fn test_create_accepts_health_without_status() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(&temp, r#"  health) echo '{"ok":true}' ;;"#);

        assert!(SubprocessBackend::create(config).await.is_some());
    }

    #[tokio::test]
    async fn test_health_request_carries_workspace_dir() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(&temp, HEALTHY);

        SubprocessBackend::create(config).await.unwrap();

        let request = last_request(&temp, "health");
        assert_eq!(request["workspaceDir"], temp.path().display().to_string());
    }

    #[tokio::test]
    async fn test_search_maps_results() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(
            &temp,
            &format!(
                "{}\n{}",
                HEALTHY,
                r#"  search) echo '{"ok":true,"data":{"results":[{"id":"MEMORY.md","score":0.91,"snippet":"remember this"}]}}' ;;"#
            ),
        );
        let backend = SubprocessBackend::create(config).await.unwrap();

        let results = backend
            .search("what should I remember", &SearchOptions::new())
            .await
            .unwrap();

        assert_eq!(
            results,
            vec![SearchResult::new("MEMORY.md", 1, 1, 0.91, "remember this")]
        );
    }

    #[tokio::test]
    async fn test_search_forwards_query_and_session_key() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(
            &temp,
            &format!(
                "{}\n{}",
                HEALTHY, r#"  search) echo '{"ok":true,"data":{"results":[]}}' ;;"#
            ),
        );
        let backend = SubprocessBackend::create(config).await.unwrap();

        let opts = SearchOptions::new()
            .max_results(4)
            .session_key("agent:main:thread-7");
        backend.search("deploy steps", &opts).await.unwrap();

        let request = last_request(&temp, "search");
        assert_eq!(request["query"], "deploy steps");
        assert_eq!(request["sessionKey"], "agent:main:thread-7");
        assert_eq!(request["maxResults"], 4);
        assert_eq!(request["workspaceDir"], temp.path().display().to_string());
    }

    #[tokio::test]
    async fn test_search_normalizes_loose_entries() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(
            &temp,
            &format!(
                "{}\n{}",
                HEALTHY,
                r#"  search) echo '{"data":{"results":[{"score":"0.2"},{"path":"memory/2026-01-02.md","score":0.7,"snippet":null},{"id":"notes.md"}]}}' ;;"#
            ),
        );
        let backend = SubprocessBackend::create(config).await.unwrap();

        let results = backend.search("q", &SearchOptions::new()).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].path, "memory/2026-01-02.md");
        assert_eq!(results[0].snippet, "");
        assert_eq!(results[1].path, DEFAULT_MEMORY_PATH);
        assert!((results[1].score - 0.2).abs() < f64::EPSILON);
        assert_eq!(results[2].path, "notes.md");
        assert_eq!(results[2].score, 0.0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_uses_stderr() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(
            &temp,
            &format!(
                "{}\n{}",
                HEALTHY, "  search) echo 'SQLITE_BUSY: database is locked' >&2; exit 1 ;;"
            ),
        );
        let backend = SubprocessBackend::create(config).await.unwrap();

        let err = backend
            .search("q", &SearchOptions::new())
            .await
            .unwrap_err();

        assert!(err.is_process_failure());
        assert_eq!(err.to_string(), "SQLITE_BUSY: database is locked");
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_stderr_reports_code() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(&temp, &format!("{}\n{}", HEALTHY, "  search) exit 4 ;;"));
        let backend = SubprocessBackend::create(config).await.unwrap();

        let err = backend
            .search("q", &SearchOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "search exited with code 4");
    }

    #[tokio::test]
    async fn test_unparseable_output_is_invalid_response() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(
            &temp,
            &format!("{}\n{}", HEALTHY, "  search) echo 'not json at all' ;;"),
        );
        let backend = SubprocessBackend::create(config).await.unwrap();

        let err = backend
            .search("q", &SearchOptions::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("invalid response"));
    }

    #[tokio::test]
    async fn test_in_band_failure_is_error() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(
            &temp,
            &format!(
                "{}\n{}",
                HEALTHY, r#"  search) echo '{"ok":false,"error":"index rebuilding"}' ;;"#
            ),
        );
        let backend = SubprocessBackend::create(config).await.unwrap();

        let err = backend
            .search("q", &SearchOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "index rebuilding");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(&temp, &format!("{}\n{}", HEALTHY, "  search) exec sleep 10 ;;"))
            .timeout_ms(1_000);
        let backend = SubprocessBackend::create(config).await.unwrap();

        let started = Instant::now();
        let err = backend
            .search("q", &SearchOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MemoryError::Timeout { .. }));
        assert_eq!(err.to_string(), "search timed out after 1000ms");
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_read_file_joins_content_lines() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(
            &temp,
            &format!(
                "{}\n{}",
                HEALTHY,
                r##"  fetch) echo '{"ok":true,"data":{"content":["# Memory","- likes tea"]}}' ;;"##
            ),
        );
        let backend = SubprocessBackend::create(config).await.unwrap();

        let result = backend
            .read_file(&ReadFileRequest::new("MEMORY.md").window(1, 2))
            .await
            .unwrap();

        assert_eq!(result.text, "# Memory\n- likes tea");
        assert_eq!(result.path, "MEMORY.md");

        let request = last_request(&temp, "fetch");
        assert_eq!(request["relPath"], "MEMORY.md");
        assert_eq!(request["from"], 1);
        assert_eq!(request["lines"], 2);
    }

    #[tokio::test]
    async fn test_read_file_without_content_is_empty() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(
            &temp,
            &format!("{}\n{}", HEALTHY, r#"  fetch) echo '{"ok":true,"data":{}}' ;;"#),
        );
        let backend = SubprocessBackend::create(config).await.unwrap();

        let result = backend
            .read_file(&ReadFileRequest::new("memory/empty.md"))
            .await
            .unwrap();

        assert_eq!(result.text, "");
    }

    #[tokio::test]
    async fn test_sync_invokes_flush() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(
            &temp,
            &format!("{}\n{}", HEALTHY, r#"  flush) echo '{"ok":true}' ;;"#),
        );
        let backend = SubprocessBackend::create(config).await.unwrap();

        assert!(backend.supports_sync());
        backend
            .sync(&SyncRequest::with_reason("session-start").force(true))
            .await
            .unwrap();

        let request = last_request(&temp, "flush");
        assert_eq!(request["reason"], "session-start");
        assert_eq!(request["force"], true);
    }

    #[tokio::test]
    async fn test_closed_adapter_rejects_calls() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(&temp, HEALTHY);
        let backend = SubprocessBackend::create(config).await.unwrap();

        backend.close().await.unwrap();
        backend.close().await.unwrap();

        let err = backend
            .search("q", &SearchOptions::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn test_status_and_probes() {
        let temp = TempDir::new().unwrap();
        let config = fake_adapter(&temp, HEALTHY);
        let backend = SubprocessBackend::create(config).await.unwrap();

        let status = backend.status();
        assert_eq!(status.backend, ProviderKind::Subprocess);
        assert_eq!(status.provider, "sh");
        assert_eq!(status.model.as_deref(), Some("mini-embed"));
        assert_eq!(status.custom["health"]["backend_available"], true);
        assert!(status.fallback.is_none());

        assert!(backend.probe_embedding_availability().await.ok);
        assert!(backend.probe_vector_availability().await);
    }

    #[test]
    fn test_request_body_merges_workspace_dir() {
        let body = request_body(json!({"query": "tea"}), Path::new("/work/agent")).unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["query"], "tea");
        assert_eq!(value["workspaceDir"], "/work/agent");
    }

    #[test]
    fn test_request_body_rejects_non_object() {
        assert!(request_body(json!([1, 2]), Path::new("/work")).is_err());
    }

    #[test]
    fn test_map_hit_prefers_id_over_path() {
        let hit = map_hit(&json!({"id": "a.md", "path": "b.md", "score": 1}));
        assert_eq!(hit.path, "a.md");
        assert_eq!(hit.start_line, 1);
        assert_eq!(hit.end_line, 1);
    }

    #[test]
    fn test_coerce_score() {
        assert_eq!(coerce_score(Some(&json!(0.5))), 0.5);
        assert_eq!(coerce_score(Some(&json!(" 0.25 "))), 0.25);
        assert_eq!(coerce_score(Some(&json!("high"))), 0.0);
        assert_eq!(coerce_score(Some(&json!({"v": 1}))), 0.0);
        assert_eq!(coerce_score(None), 0.0);
    }
}
