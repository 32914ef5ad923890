//! Search command for memsearch.
//!
//! Runs a query against the selected memory backend.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backends::{MemoryBackend, SearchOptions as QueryOptions, SearchResult};

/// Options for the search command.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Minimum score.
    pub min_score: Option<f64>,
    /// Conversation-scoped context key.
    pub session_key: Option<String>,
}

/// Output format for the search command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutput {
    /// Whether the search was successful.
    pub success: bool,
    /// The search query used.
    pub query: String,
    /// Provider that answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Set when the answer came from a fallback provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    /// Number of results found.
    pub count: usize,
    /// The search results.
    pub results: Vec<SearchResult>,
    /// Error message if search failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchOutput {
    /// Create a successful output.
    pub fn success(query: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            success: true,
            query: query.into(),
            provider: None,
            fallback_reason: None,
            count: results.len(),
            results,
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            query: query.into(),
            provider: None,
            fallback_reason: None,
            count: 0,
            results: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The search command implementation.
pub struct SearchCommand {
    backend: Arc<dyn MemoryBackend>,
}

impl SearchCommand {
    /// Create a new search command.
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    /// Run the search command with the given query.
    pub async fn run(&self, query: &str, options: &SearchOptions) -> SearchOutput {
        let trimmed_query = query.trim();
        if trimmed_query.is_empty() {
            return SearchOutput::failure("", "Search query cannot be empty");
        }

        let mut opts = QueryOptions::new();
        if let Some(limit) = options.limit {
            opts = opts.max_results(limit);
        }
        if let Some(min_score) = options.min_score {
            opts = opts.min_score(min_score);
        }
        if let Some(key) = &options.session_key {
            opts = opts.session_key(key.clone());
        }

        match self.backend.search(trimmed_query, &opts).await {
            Ok(results) => {
                // Status is read after the search so a degrade it caused shows up.
                let status = self.backend.status();
                let mut output = SearchOutput::success(trimmed_query, results);
                output.provider = Some(status.provider);
                output.fallback_reason = status.fallback.map(|f| f.reason);
                output
            }
            Err(e) => SearchOutput::failure(trimmed_query, e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &SearchOutput, options: &SearchOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &SearchOutput) -> String {
        if !output.success {
            return format!(
                "Search failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let mut lines = Vec::new();
        if let Some(reason) = &output.fallback_reason {
            lines.push(format!("(primary backend unavailable: {})", reason));
        }

        if output.results.is_empty() {
            lines.push(format!("No memories found for query: \"{}\"", output.query));
            return lines.join("\n") + "\n";
        }

        lines.push(format!(
            "Found {} memory hit(s) for query: \"{}\"\n",
            output.count, output.query
        ));

        for (i, result) in output.results.iter().enumerate() {
            lines.push(format!(
                "{}. {}:{}-{} (score: {:.2})",
                i + 1,
                result.path,
                result.start_line,
                result.end_line,
                result.score
            ));
            for snippet_line in result.snippet.lines().filter(|l| !l.trim().is_empty()) {
                lines.push(format!("   {}", snippet_line));
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::testing::{fallback_factory, MockBackend};
    use crate::backends::{BuiltinBackend, BuiltinConfig, FallbackBackend, ProviderKind};
    use std::fs;
    use tempfile::TempDir;

    async fn setup_builtin() -> (TempDir, SearchCommand) {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("MEMORY.md"),
            "# Memory\n\nRelease branches are cut on Thursdays.\n",
        )
        .unwrap();
        fs::create_dir_all(temp.path().join("memory")).unwrap();
        fs::write(
            temp.path().join("memory").join("2026-02-01.md"),
            "Hotfix releases skip the Thursday cut.\n",
        )
        .unwrap();

        let backend = BuiltinBackend::create(BuiltinConfig::new(temp.path()))
            .await
            .unwrap();
        (temp, SearchCommand::new(Arc::new(backend)))
    }

    #[tokio::test]
    async fn test_search_finds_memories() {
        let (_temp, cmd) = setup_builtin().await;

        let output = cmd.run("release thursday", &SearchOptions::default()).await;

        assert!(output.success);
        assert_eq!(output.count, 2);
        assert_eq!(output.provider.as_deref(), Some("lexical"));
        assert!(output.fallback_reason.is_none());
    }

    #[tokio::test]
    async fn test_search_with_limit() {
        let (_temp, cmd) = setup_builtin().await;
        let options = SearchOptions {
            limit: Some(1),
            ..Default::default()
        };

        let output = cmd.run("thursday", &options).await;

        assert_eq!(output.count, 1);
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let (_temp, cmd) = setup_builtin().await;

        let output = cmd.run("   ", &SearchOptions::default()).await;

        assert!(!output.success);
        assert!(output.error.unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_search_reports_fallback() {
        let primary = MockBackend::new(ProviderKind::Subprocess, "primary");
        primary.fail_searches("database is locked");
        let fallback = MockBackend::new(ProviderKind::Builtin, "fallback");
        let (factory, _) = fallback_factory(Some(fallback.clone()));
        let backend = FallbackBackend::new(Arc::new(primary), ProviderKind::Subprocess, Some(factory));
        let cmd = SearchCommand::new(Arc::new(backend));

        let options = SearchOptions {
            session_key: Some("chat-7".to_string()),
            ..Default::default()
        };
        let output = cmd.run("anything", &options).await;

        assert!(output.success);
        assert_eq!(output.provider.as_deref(), Some("fallback"));
        assert!(output
            .fallback_reason
            .as_deref()
            .unwrap()
            .contains("database is locked"));
        assert_eq!(fallback.session_keys(), vec![Some("chat-7".to_string())]);
    }

    #[tokio::test]
    async fn test_search_failure() {
        let primary = MockBackend::new(ProviderKind::Builtin, "primary");
        primary.fail_searches("index corrupted");
        let cmd = SearchCommand::new(Arc::new(primary));

        let output = cmd.run("q", &SearchOptions::default()).await;

        assert!(!output.success);
        assert_eq!(output.error.as_deref(), Some("backend error: index corrupted"));
    }

    #[tokio::test]
    async fn test_format_output() {
        let (_temp, cmd) = setup_builtin().await;
        let output = cmd.run("hotfix", &SearchOptions::default()).await;

        let text = cmd.format_output(&output, &SearchOptions::default());
        assert!(text.contains("Found 1 memory hit(s)"));
        assert!(text.contains("memory/2026-02-01.md:1-1"));

        let json = cmd.format_output(
            &output,
            &SearchOptions {
                json: true,
                ..Default::default()
            },
        );
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["results"][0]["startLine"], 1);

        let quiet = cmd.format_output(
            &output,
            &SearchOptions {
                quiet: true,
                ..Default::default()
            },
        );
        assert!(quiet.is_empty());
    }
}
