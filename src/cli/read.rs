//! Read command for memsearch.
//!
//! Prints a memory file, or a line window of it, through the selected backend.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backends::{MemoryBackend, ReadFileRequest};

/// Options for the read command.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// First line to return (1-based).
    pub from: Option<usize>,
    /// Number of lines to return.
    pub lines: Option<usize>,
}

/// Output format for the read command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadOutput {
    /// Whether the read was successful.
    pub success: bool,
    /// Path that was read.
    pub path: String,
    /// File text.
    pub text: String,
    /// Error message if the read failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadOutput {
    /// Create a successful output.
    pub fn success(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            success: true,
            path: path.into(),
            text: text.into(),
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            path: path.into(),
            text: String::new(),
            error: Some(error.into()),
        }
    }
}

/// The read command implementation.
pub struct ReadCommand {
    backend: Arc<dyn MemoryBackend>,
}

impl ReadCommand {
    /// Create a new read command.
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    /// Read `rel_path` from the workspace.
    pub async fn run(&self, rel_path: &str, options: &ReadOptions) -> ReadOutput {
        let mut request = ReadFileRequest::new(rel_path);
        request.from = options.from;
        request.lines = options.lines;

        match self.backend.read_file(&request).await {
            Ok(result) => ReadOutput::success(result.path, result.text),
            Err(e) => ReadOutput::failure(rel_path, e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ReadOutput, options: &ReadOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        if !output.success {
            return format!(
                "Read failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        if output.text.ends_with('\n') {
            output.text.clone()
        } else {
            format!("{}\n", output.text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BuiltinBackend, BuiltinConfig};
    use std::fs;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, ReadCommand) {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("MEMORY.md"),
            "# Memory\nline two\nline three\nline four\n",
        )
        .unwrap();
        let backend = BuiltinBackend::create(BuiltinConfig::new(temp.path()))
            .await
            .unwrap();
        (temp, ReadCommand::new(Arc::new(backend)))
    }

    #[tokio::test]
    async fn test_read_whole_file() {
        let (_temp, cmd) = setup().await;

        let output = cmd.run("MEMORY.md", &ReadOptions::default()).await;

        assert!(output.success);
        assert_eq!(output.path, "MEMORY.md");
        assert!(output.text.starts_with("# Memory\n"));
    }

    #[tokio::test]
    async fn test_read_window() {
        let (_temp, cmd) = setup().await;
        let options = ReadOptions {
            from: Some(2),
            lines: Some(2),
            ..Default::default()
        };

        let output = cmd.run("MEMORY.md", &options).await;

        assert_eq!(output.text, "line two\nline three");
        assert_eq!(cmd.format_output(&output, &options), "line two\nline three\n");
    }

    #[tokio::test]
    async fn test_read_rejects_escape() {
        let (_temp, cmd) = setup().await;

        let output = cmd.run("../etc/passwd", &ReadOptions::default()).await;

        assert!(!output.success);
        assert!(cmd
            .format_output(&output, &ReadOptions::default())
            .starts_with("Read failed:"));
    }
}
