//! Configuration loading for memsearch.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.memsearch/config.toml`)
//! 3. User config (`~/.memsearch/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. Without any config the subprocess provider
//! is skipped (no command) and the built-in index serves the workspace.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::backends::builtin::{DEFAULT_CHUNK_LINES, DEFAULT_SNIPPET_CHARS};
use crate::backends::subprocess::DEFAULT_TIMEOUT_MS;
use crate::backends::ProviderKind;
use crate::error::{MemoryError, Result};

/// Name of the per-project and per-user config directory.
pub const CONFIG_DIR_NAME: &str = ".memsearch";

/// Smallest accepted subprocess timeout.
pub const MIN_TIMEOUT_MS: u64 = 100;

/// Main configuration struct for memsearch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Workspace searched when no agent override applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
    /// Provider discovery configuration.
    pub backends: BackendsConfig,
    /// Subprocess provider settings.
    pub subprocess: SubprocessSettings,
    /// Built-in index settings.
    pub builtin: BuiltinSettings,
    /// Per-agent overrides, keyed by agent id.
    pub agents: HashMap<String, AgentConfig>,
}

/// Provider discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendsConfig {
    /// Ordered list of provider kinds to try.
    pub discovery: Vec<String>,
    /// Per-provider enable/disable overrides.
    pub overrides: HashMap<String, bool>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            discovery: vec!["subprocess".to_string(), "builtin".to_string()],
            overrides: HashMap::new(),
        }
    }
}

/// Settings for the subprocess provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubprocessSettings {
    /// Adapter executable. The provider is skipped when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments placed before the operation name.
    pub args: Vec<String>,
    /// Wall-clock budget per adapter call.
    pub timeout_ms: u64,
    /// Extra environment for the adapter process.
    pub env: BTreeMap<String, String>,
}

impl Default for SubprocessSettings {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            env: BTreeMap::new(),
        }
    }
}

impl SubprocessSettings {
    /// Check if a timeout value is acceptable.
    pub fn is_valid_timeout(value: u64) -> bool {
        value >= MIN_TIMEOUT_MS
    }
}

/// Settings for the built-in lexical index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuiltinSettings {
    /// Lines per indexed chunk.
    pub chunk_lines: usize,
    /// Maximum snippet length in characters.
    pub snippet_chars: usize,
}

impl Default for BuiltinSettings {
    fn default() -> Self {
        Self {
            chunk_lines: DEFAULT_CHUNK_LINES,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }
}

/// Per-agent overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Workspace for this agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
    /// Discovery order for this agent, replacing `[backends] discovery`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<Vec<String>>,
    /// Subprocess settings for this agent, layered over `[subprocess]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subprocess: Option<SubprocessOverride>,
}

/// Per-agent subprocess settings. Unset fields inherit `[subprocess]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubprocessOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Merged over the global adapter environment.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl SubprocessOverride {
    fn merge(&mut self, other: SubprocessOverride) {
        if other.command.is_some() {
            self.command = other.command;
        }
        if other.args.is_some() {
            self.args = other.args;
        }
        if other.timeout_ms.is_some() {
            self.timeout_ms = other.timeout_ms;
        }
        self.env.extend(other.env);
    }
}

impl Config {
    /// Load configuration with full precedence chain.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Load user config from `~/.memsearch/config.toml`.
    fn load_user_config() -> Option<Config> {
        let path = memsearch_home()?.join("config.toml");
        Self::load_optional(&path)
    }

    /// Load project config from `.memsearch/config.toml` at the project root.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        let path = project_dir(cwd).join("config.toml");
        Self::load_optional(&path)
    }

    /// Load a config file that may not exist. Parse errors are logged.
    fn load_optional(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        match Self::load_from_file(path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("ignoring config {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Load config from a specific file path.
    ///
    /// Out-of-range timeouts are replaced (global) or dropped (per agent)
    /// with a warning, matching how `MEMSEARCH_TIMEOUT_MS` is treated.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| MemoryError::storage(path, e))?;
        let mut config: Config =
            toml::from_str(&content).map_err(|e| MemoryError::config(e.to_string()))?;
        config.validate_timeouts(path);
        Ok(config)
    }

    fn validate_timeouts(&mut self, source: &Path) {
        if !SubprocessSettings::is_valid_timeout(self.subprocess.timeout_ms) {
            tracing::warn!(
                "invalid subprocess timeout_ms {} in {}, must be >= {}; using {}",
                self.subprocess.timeout_ms,
                source.display(),
                MIN_TIMEOUT_MS,
                DEFAULT_TIMEOUT_MS
            );
            self.subprocess.timeout_ms = DEFAULT_TIMEOUT_MS;
        }

        for (id, agent) in self.agents.iter_mut() {
            let Some(sub) = agent.subprocess.as_mut() else {
                continue;
            };
            if let Some(ms) = sub.timeout_ms {
                if !SubprocessSettings::is_valid_timeout(ms) {
                    tracing::warn!(
                        "invalid timeout_ms {} for agent '{}' in {}, must be >= {}; ignoring",
                        ms,
                        id,
                        source.display(),
                        MIN_TIMEOUT_MS
                    );
                    sub.timeout_ms = None;
                }
            }
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // MEMSEARCH_BACKEND moves one kind to the front of discovery
        if let Ok(val) = env::var("MEMSEARCH_BACKEND") {
            match ProviderKind::parse(&val) {
                Some(kind) => {
                    self.backends
                        .discovery
                        .retain(|name| ProviderKind::parse(name) != Some(kind));
                    self.backends.discovery.insert(0, kind.as_str().to_string());
                }
                None => tracing::warn!(
                    "invalid MEMSEARCH_BACKEND value '{}', expected 'subprocess' or 'builtin'",
                    val
                ),
            }
        }

        if let Ok(val) = env::var("MEMSEARCH_COMMAND") {
            let trimmed = val.trim();
            if trimmed.is_empty() {
                tracing::warn!("MEMSEARCH_COMMAND is empty, ignoring");
            } else {
                self.subprocess.command = Some(trimmed.to_string());
            }
        }

        if let Ok(val) = env::var("MEMSEARCH_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if SubprocessSettings::is_valid_timeout(ms) => {
                    self.subprocess.timeout_ms = ms;
                }
                _ => tracing::warn!(
                    "invalid MEMSEARCH_TIMEOUT_MS value '{}', must be an integer >= {}; using {}",
                    val,
                    MIN_TIMEOUT_MS,
                    self.subprocess.timeout_ms
                ),
            }
        }

        if let Ok(val) = env::var("MEMSEARCH_WORKSPACE") {
            if val.is_empty() {
                tracing::warn!("MEMSEARCH_WORKSPACE is empty, ignoring");
            } else {
                self.workspace = Some(PathBuf::from(val));
            }
        }
    }

    /// Merge another config into this one.
    ///
    /// Values from `other` win when they differ from the defaults, so a layer
    /// only needs to spell out its customizations. A layer cannot reset a
    /// lower layer's value back to the default.
    fn merge(mut self, other: Config) -> Self {
        if other.workspace.is_some() {
            self.workspace = other.workspace;
        }

        if other.backends.discovery != BackendsConfig::default().discovery {
            self.backends.discovery = other.backends.discovery;
        }
        for (k, v) in other.backends.overrides {
            self.backends.overrides.insert(k, v);
        }

        let default_subprocess = SubprocessSettings::default();
        if other.subprocess.command.is_some() {
            self.subprocess.command = other.subprocess.command;
        }
        if other.subprocess.args != default_subprocess.args {
            self.subprocess.args = other.subprocess.args;
        }
        for (k, v) in other.subprocess.env {
            self.subprocess.env.insert(k, v);
        }
        if other.subprocess.timeout_ms != default_subprocess.timeout_ms {
            self.subprocess.timeout_ms = other.subprocess.timeout_ms;
        }

        let default_builtin = BuiltinSettings::default();
        if other.builtin.chunk_lines != default_builtin.chunk_lines {
            self.builtin.chunk_lines = other.builtin.chunk_lines;
        }
        if other.builtin.snippet_chars != default_builtin.snippet_chars {
            self.builtin.snippet_chars = other.builtin.snippet_chars;
        }

        for (id, agent) in other.agents {
            let entry = self.agents.entry(id).or_default();
            if agent.workspace.is_some() {
                entry.workspace = agent.workspace;
            }
            if agent.discovery.is_some() {
                entry.discovery = agent.discovery;
            }
            if let Some(sub) = agent.subprocess {
                entry.subprocess.get_or_insert_with(Default::default).merge(sub);
            }
        }

        self
    }

    /// Discovery order for an agent, as provider kinds.
    ///
    /// Unknown names are skipped with a warning; duplicates keep their first
    /// position.
    pub fn discovery_for(&self, agent_id: &str) -> Vec<ProviderKind> {
        let names = self
            .agents
            .get(agent_id)
            .and_then(|a| a.discovery.as_ref())
            .unwrap_or(&self.backends.discovery);

        let mut kinds = Vec::new();
        for name in names {
            match ProviderKind::parse(name) {
                Some(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Some(_) => {}
                None => tracing::warn!("unknown memory backend '{}' in discovery", name),
            }
        }
        kinds
    }

    /// Whether a provider kind is enabled by `[backends] overrides`.
    ///
    /// Kinds are enabled unless explicitly set to `false`.
    pub fn is_enabled(&self, kind: ProviderKind) -> bool {
        self.backends
            .overrides
            .iter()
            .filter(|(name, _)| ProviderKind::parse(name) == Some(kind))
            .all(|(_, enabled)| *enabled)
    }

    /// Subprocess settings for an agent: `[subprocess]` with the agent's
    /// `[agents.<id>.subprocess]` fields laid over it.
    pub fn subprocess_for(&self, agent_id: &str) -> SubprocessSettings {
        let mut settings = self.subprocess.clone();
        let Some(sub) = self
            .agents
            .get(agent_id)
            .and_then(|a| a.subprocess.as_ref())
        else {
            return settings;
        };

        if let Some(command) = &sub.command {
            settings.command = Some(command.clone());
        }
        if let Some(args) = &sub.args {
            settings.args = args.clone();
        }
        if let Some(ms) = sub.timeout_ms {
            settings.timeout_ms = ms;
        }
        settings
            .env
            .extend(sub.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        settings
    }

    /// Configured workspace for an agent, if any.
    pub fn workspace_for(&self, agent_id: &str) -> Option<&Path> {
        self.agents
            .get(agent_id)
            .and_then(|a| a.workspace.as_deref())
            .or(self.workspace.as_deref())
    }
}

/// Get the memsearch home directory.
///
/// Uses `MEMSEARCH_HOME` when set and non-empty, otherwise `~/.memsearch`.
pub fn memsearch_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("MEMSEARCH_HOME") {
        if home.is_empty() {
            tracing::warn!("MEMSEARCH_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("MEMSEARCH_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(CONFIG_DIR_NAME));
    }

    let fallback_path = fallback_memsearch_home();
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback_path.display()
    );
    Some(fallback_path)
}

#[cfg(unix)]
fn fallback_memsearch_home() -> PathBuf {
    use std::os::unix::fs::MetadataExt;
    let uid = std::fs::metadata("/").map(|m| m.uid()).unwrap_or(0);
    PathBuf::from(format!("/tmp/memsearch-{}", uid))
}

#[cfg(not(unix))]
fn fallback_memsearch_home() -> PathBuf {
    std::env::temp_dir().join("memsearch")
}

/// Find the project root for a given working directory.
///
/// Precedence:
/// 1. The nearest ancestor (or `cwd` itself) containing `.memsearch/`
/// 2. The git repository root, via `git rev-parse --show-toplevel`
/// 3. `cwd`
pub fn find_project_root(cwd: &Path) -> PathBuf {
    for ancestor in cwd.ancestors() {
        if ancestor.join(CONFIG_DIR_NAME).is_dir() {
            return ancestor.to_path_buf();
        }
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(cwd)
        .output()
    {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
        }
    }

    cwd.to_path_buf()
}

/// Get the project config directory (`<project_root>/.memsearch`).
pub fn project_dir(cwd: &Path) -> PathBuf {
    find_project_root(cwd).join(CONFIG_DIR_NAME)
}
