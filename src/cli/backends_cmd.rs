//! Backends command for memsearch.
//!
//! Shows the discovery order for an agent and which provider would be tried
//! first. Nothing is constructed or spawned.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::backends::ProviderKind;
use crate::config::Config;
use crate::discovery::{detect_backends, resolve_workspace, BackendInfo};

/// Options for the backends command.
#[derive(Debug, Clone, Default)]
pub struct BackendsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the backends command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsOutput {
    /// Whether the command was successful.
    pub success: bool,
    /// Agent the discovery order belongs to.
    pub agent: String,
    /// Workspace the agent resolves to.
    pub workspace: String,
    /// Providers in discovery order.
    pub backends: Vec<BackendDetail>,
    /// The provider tried first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
    /// Error message if command failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Detailed backend information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendDetail {
    /// Provider kind.
    pub name: String,
    /// Not disabled by overrides.
    pub enabled: bool,
    /// Has what it needs to start.
    pub configured: bool,
    /// Whether this is the provider tried first.
    pub is_primary: bool,
    /// Command or index description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BackendDetail {
    fn from_info(info: &BackendInfo, config: &Config, agent_id: &str) -> Self {
        let detail = match info.kind {
            ProviderKind::Subprocess => config.subprocess_for(agent_id).command,
            ProviderKind::Builtin => Some(format!(
                "lexical, {} lines per chunk",
                config.builtin.chunk_lines
            )),
        };
        Self {
            name: info.kind.as_str().to_string(),
            enabled: info.enabled,
            configured: info.configured,
            is_primary: info.is_primary,
            detail,
        }
    }
}

/// The backends command implementation.
pub struct BackendsCommand {
    cwd: String,
    agent: String,
    config: Config,
}

impl BackendsCommand {
    /// Create a new backends command.
    pub fn new(cwd: impl Into<String>, agent: impl Into<String>, config: Config) -> Self {
        Self {
            cwd: cwd.into(),
            agent: agent.into(),
            config,
        }
    }

    /// Run the backends command.
    pub fn run(&self, _options: &BackendsOptions) -> BackendsOutput {
        let backends = detect_backends(&self.config, &self.agent);
        let workspace = resolve_workspace(&self.config, &self.agent, Path::new(&self.cwd));

        let details: Vec<BackendDetail> = backends
            .iter()
            .map(|info| BackendDetail::from_info(info, &self.config, &self.agent))
            .collect();
        let active = backends
            .iter()
            .find(|b| b.is_primary)
            .map(|b| b.kind.as_str().to_string());

        BackendsOutput {
            success: true,
            agent: self.agent.clone(),
            workspace: workspace.display().to_string(),
            backends: details,
            active,
            error: None,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &BackendsOutput, options: &BackendsOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &BackendsOutput) -> String {
        if !output.success {
            return format!(
                "Backends command failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        if output.backends.is_empty() {
            return "No backends in discovery order.\n".to_string();
        }

        let mut lines = vec![
            format!("Agent: {}", output.agent),
            format!("Workspace: {}", output.workspace),
            String::new(),
            "Discovery order:".to_string(),
        ];

        for backend in &output.backends {
            let marker = match (backend.enabled, backend.configured) {
                (false, _) => "x",
                (true, false) => "-",
                (true, true) => "+",
            };
            let detail = backend
                .detail
                .as_ref()
                .map(|d| format!(" ({})", d))
                .unwrap_or_default();
            lines.push(format!("  [{}] {}{}", marker, backend.name, detail));
        }

        lines.push(String::new());
        match &output.active {
            Some(active) => lines.push(format!("Active backend: {}", active)),
            None => lines.push("No usable backend configured.".to_string()),
        }

        lines.join("\n") + "\n"
    }
}
