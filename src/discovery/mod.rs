//! Discovery module for memsearch.
//!
//! Resolves configuration into per-provider settings and selects the
//! provider an agent should use.
//!
//! Discovery order is configurable globally and per agent. Individual
//! providers can be enabled or disabled via overrides.

pub mod backends;

pub use backends::{
    detect_backends, resolve_backend_config, resolve_workspace, select_backend, BackendInfo,
    BackendSelection, ResolvedBackendConfig,
};
