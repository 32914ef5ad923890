//! Memory backend selection for memsearch.
//!
//! Walks the configured discovery order for an agent, resolving each
//! provider kind's settings and asking the [`ProviderCache`] for a handle.
//! The first provider that constructs wins; a provider that declines is
//! skipped. Only when every enabled provider declines or fails is an error
//! returned, and it is returned as a value alongside the absent handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backends::{
    BuiltinConfig, FallbackBackend, MemoryBackend, ProviderKind, SubprocessConfig,
};
use crate::cache::ProviderCache;
use crate::config::{find_project_root, BuiltinSettings, Config, SubprocessSettings};
use crate::error::{MemoryError, Result};

/// Fully resolved settings for one provider kind and workspace.
///
/// This is the value fingerprinted into the cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedBackendConfig {
    /// Provider kind these settings are for.
    pub kind: ProviderKind,
    /// Workspace the provider serves.
    pub workspace_dir: PathBuf,
    /// Built-in index settings; also used for the fallback of other kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builtin: Option<BuiltinSettings>,
    /// Subprocess settings, for the subprocess kind only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subprocess: Option<SubprocessSettings>,
}

impl ResolvedBackendConfig {
    /// Settings for the built-in index.
    pub fn builtin(workspace_dir: &Path, settings: BuiltinSettings) -> Self {
        Self {
            kind: ProviderKind::Builtin,
            workspace_dir: workspace_dir.to_path_buf(),
            builtin: Some(settings),
            subprocess: None,
        }
    }

    /// Settings for a subprocess provider, with a default built-in fallback.
    pub fn subprocess(workspace_dir: &Path, settings: SubprocessSettings) -> Self {
        Self {
            kind: ProviderKind::Subprocess,
            workspace_dir: workspace_dir.to_path_buf(),
            builtin: Some(BuiltinSettings::default()),
            subprocess: Some(settings),
        }
    }

    /// Replace the built-in settings.
    pub fn with_builtin(mut self, settings: BuiltinSettings) -> Self {
        self.builtin = Some(settings);
        self
    }

    /// Config for constructing the built-in index over this workspace.
    pub fn builtin_config(&self) -> BuiltinConfig {
        let settings = self.builtin.clone().unwrap_or_default();
        BuiltinConfig {
            workspace_dir: self.workspace_dir.clone(),
            chunk_lines: settings.chunk_lines,
            snippet_chars: settings.snippet_chars,
        }
    }

    /// Config for spawning the subprocess provider, when a command is set.
    pub fn subprocess_config(&self) -> Option<SubprocessConfig> {
        let settings = self.subprocess.as_ref()?;
        let command = settings.command.as_ref()?;
        Some(SubprocessConfig {
            command: command.clone(),
            args: settings.args.clone(),
            env: settings.env.clone(),
            timeout_ms: settings.timeout_ms,
            workspace_dir: self.workspace_dir.clone(),
        })
    }
}

/// Resolve the workspace for an agent.
///
/// A configured workspace wins (relative paths are taken from `cwd`);
/// otherwise the project root of `cwd`.
pub fn resolve_workspace(config: &Config, agent_id: &str, cwd: &Path) -> PathBuf {
    match config.workspace_for(agent_id) {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => cwd.join(path),
        None => find_project_root(cwd),
    }
}

/// Resolve the settings for one provider kind.
pub fn resolve_backend_config(
    config: &Config,
    agent_id: &str,
    kind: ProviderKind,
    cwd: &Path,
) -> ResolvedBackendConfig {
    let workspace = resolve_workspace(config, agent_id, cwd);
    match kind {
        ProviderKind::Builtin => ResolvedBackendConfig::builtin(&workspace, config.builtin.clone()),
        ProviderKind::Subprocess => {
            ResolvedBackendConfig::subprocess(&workspace, config.subprocess_for(agent_id))
                .with_builtin(config.builtin.clone())
        }
    }
}

/// Outcome of provider selection.
#[derive(Debug)]
pub struct BackendSelection {
    /// The selected handle, absent when nothing could be constructed.
    pub handle: Option<Arc<FallbackBackend>>,
    /// Kind of the selected provider.
    pub kind: Option<ProviderKind>,
    /// Why no provider was selected.
    pub error: Option<MemoryError>,
}

impl BackendSelection {
    fn selected(kind: ProviderKind, handle: Arc<FallbackBackend>) -> Self {
        Self {
            handle: Some(handle),
            kind: Some(kind),
            error: None,
        }
    }

    fn unavailable(error: MemoryError) -> Self {
        Self {
            handle: None,
            kind: None,
            error: Some(error),
        }
    }

    /// Close the selected handle, then everything left in `cache`.
    ///
    /// A handle that degraded has already left the cache, so closing the
    /// cache alone would leak its fallback.
    pub async fn release(self, cache: &ProviderCache) -> Result<()> {
        let mut first_error = None;
        if let Some(handle) = self.handle {
            if let Err(err) = handle.close().await {
                debug!("closing selected memory backend: {}", err);
                first_error = Some(err);
            }
        }
        if let Err(err) = cache.close_all().await {
            first_error.get_or_insert(err);
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Select a memory backend for an agent.
///
/// Tries each enabled kind in discovery order through the cache. Provider
/// declines and construction errors move on to the next kind.
pub async fn select_backend(
    cache: &ProviderCache,
    config: &Config,
    agent_id: &str,
    cwd: &Path,
) -> BackendSelection {
    let mut failures = Vec::new();

    for kind in config.discovery_for(agent_id) {
        if !config.is_enabled(kind) {
            debug!("memory backend '{}' disabled by overrides", kind);
            continue;
        }

        let resolved = resolve_backend_config(config, agent_id, kind, cwd);
        match cache.get(agent_id, kind, &resolved).await {
            Ok(Some(handle)) => return BackendSelection::selected(kind, handle),
            Ok(None) => failures.push(format!("{}: unavailable", kind)),
            Err(err) => {
                warn!("memory backend '{}' failed to start: {}", kind, err);
                failures.push(format!("{}: {}", kind, err));
            }
        }
    }

    let message = if failures.is_empty() {
        "no memory backend enabled".to_string()
    } else {
        failures.join("; ")
    };
    BackendSelection::unavailable(MemoryError::unavailable(message))
}

/// A provider kind as seen by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInfo {
    /// The provider kind.
    pub kind: ProviderKind,
    /// Not disabled by overrides.
    pub enabled: bool,
    /// Has the settings it needs to start (a subprocess needs a command).
    pub configured: bool,
    /// First enabled and configured kind in discovery order.
    pub is_primary: bool,
}

/// List the discovery order for an agent without constructing anything.
pub fn detect_backends(config: &Config, agent_id: &str) -> Vec<BackendInfo> {
    let mut backends: Vec<BackendInfo> = config
        .discovery_for(agent_id)
        .into_iter()
        .map(|kind| BackendInfo {
            kind,
            enabled: config.is_enabled(kind),
            configured: match kind {
                ProviderKind::Builtin => true,
                ProviderKind::Subprocess => config.subprocess_for(agent_id).command.is_some(),
            },
            is_primary: false,
        })
        .collect();

    if let Some(primary) = backends.iter_mut().find(|b| b.enabled && b.configured) {
        primary.is_primary = true;
    }
    backends
}
