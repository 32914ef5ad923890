//! Memory search providers.
//!
//! This module provides the capability contract and the providers that
//! implement it.
//!
//! Available providers:
//! - **Builtin**: lexical index over the workspace's markdown memory files
//! - **Subprocess**: external provider spoken to over a JSON stdin/stdout protocol
//!
//! [`FallbackBackend`] wraps either one and degrades to a fallback provider
//! after the first failed search.

pub mod builtin;
pub mod fallback;
pub mod subprocess;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use builtin::{BuiltinBackend, BuiltinConfig};
pub use fallback::{EvictFn, FallbackBackend, FallbackFactory};
pub use subprocess::{SubprocessBackend, SubprocessConfig};
pub use traits::{
    BackendStatus, EmbeddingProbe, FallbackNote, MemoryBackend, ProviderKind, ReadFileRequest,
    ReadFileResult, ResultSource, SearchOptions, SearchResult, SyncProgress, SyncRequest,
};
