//! memsearch - memory search coordination layer
//!
//! memsearch answers memory queries for agents through a pluggable provider.
//! Providers are discovered per agent, cached by configuration fingerprint,
//! and wrapped so that a failing external provider degrades to the builtin
//! lexical index for the rest of its lifetime.

pub mod backends;
pub mod cache;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub(crate) mod util;

pub use backends::{
    BackendStatus, BuiltinBackend, FallbackBackend, MemoryBackend, ProviderKind, ReadFileRequest,
    ReadFileResult, SearchOptions, SearchResult, SubprocessBackend, SyncRequest,
};
pub use cache::{BackendFactory, CacheKey, DefaultBackendFactory, ProviderCache};
pub use config::Config;
pub use discovery::{
    detect_backends, resolve_backend_config, select_backend, BackendInfo, BackendSelection,
    ResolvedBackendConfig,
};
pub use error::{MemoryError, Result};

// CLI commands
pub use cli::{BackendsCommand, ReadCommand, SearchCommand, StatusCommand, SyncCommand};
