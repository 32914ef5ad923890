//! Provider handle cache for memsearch.
//!
//! Maps `(agent, provider kind, config fingerprint)` to a live
//! [`FallbackBackend`]. Entries have no TTL; they leave the cache only when
//! the wrapper they hold degrades or is closed, through the eviction callback
//! installed at insert time.

pub mod fingerprint;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::debug;

use crate::backends::{
    BuiltinBackend, EvictFn, FallbackBackend, FallbackFactory, MemoryBackend, ProviderKind,
    SubprocessBackend,
};
use crate::discovery::ResolvedBackendConfig;
use crate::error::Result;
use crate::util::lock;

pub use fingerprint::{canonicalize, fingerprint};

/// Identity of a cached provider handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub agent_id: String,
    pub kind: ProviderKind,
    pub fingerprint: String,
}

impl CacheKey {
    /// Build the key for a resolved config.
    pub fn new(agent_id: &str, kind: ProviderKind, config: &ResolvedBackendConfig) -> Result<Self> {
        Ok(Self {
            agent_id: agent_id.to_string(),
            kind,
            fingerprint: fingerprint(config)?,
        })
    }
}

/// Constructs providers for the cache.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Construct a primary provider. `Ok(None)` means the provider declined.
    async fn create(
        &self,
        kind: ProviderKind,
        config: &ResolvedBackendConfig,
    ) -> Result<Option<Arc<dyn MemoryBackend>>>;

    /// Construct the fallback used once a primary degrades.
    async fn create_fallback(
        &self,
        config: &ResolvedBackendConfig,
    ) -> Result<Option<Arc<dyn MemoryBackend>>>;
}

/// Builds subprocess and built-in providers, falling back to the built-in index.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

#[async_trait]
impl BackendFactory for DefaultBackendFactory {
    async fn create(
        &self,
        kind: ProviderKind,
        config: &ResolvedBackendConfig,
    ) -> Result<Option<Arc<dyn MemoryBackend>>> {
        match kind {
            ProviderKind::Subprocess => {
                let Some(subprocess) = config.subprocess_config() else {
                    debug!("no subprocess command configured");
                    return Ok(None);
                };
                Ok(SubprocessBackend::create(subprocess)
                    .await
                    .map(|b| Arc::new(b) as Arc<dyn MemoryBackend>))
            }
            ProviderKind::Builtin => {
                let backend = BuiltinBackend::create(config.builtin_config()).await?;
                Ok(Some(Arc::new(backend) as Arc<dyn MemoryBackend>))
            }
        }
    }

    async fn create_fallback(
        &self,
        config: &ResolvedBackendConfig,
    ) -> Result<Option<Arc<dyn MemoryBackend>>> {
        // A failed built-in index has nothing further to fall back to.
        if config.kind == ProviderKind::Builtin {
            return Ok(None);
        }
        let backend = BuiltinBackend::create(config.builtin_config()).await?;
        Ok(Some(Arc::new(backend) as Arc<dyn MemoryBackend>))
    }
}

type Entries = Mutex<HashMap<CacheKey, Arc<FallbackBackend>>>;

/// Fingerprinted cache of provider handles.
pub struct ProviderCache {
    factory: Arc<dyn BackendFactory>,
    entries: Arc<Entries>,
    /// Serializes misses so concurrent lookups of one key construct once.
    build_lock: tokio::sync::Mutex<()>,
}

impl ProviderCache {
    /// Create an empty cache that builds providers with `factory`.
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            entries: Arc::new(Mutex::new(HashMap::new())),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Get the cached handle for a key, constructing it on a miss.
    ///
    /// Returns `Ok(None)` when the provider declines; nothing is cached in
    /// that case, so the next call tries again.
    pub async fn get(
        &self,
        agent_id: &str,
        kind: ProviderKind,
        config: &ResolvedBackendConfig,
    ) -> Result<Option<Arc<FallbackBackend>>> {
        let key = CacheKey::new(agent_id, kind, config)?;
        if let Some(hit) = self.lookup(&key) {
            return Ok(Some(hit));
        }

        let _guard = self.build_lock.lock().await;
        if let Some(hit) = self.lookup(&key) {
            return Ok(Some(hit));
        }

        let Some(primary) = self.factory.create(kind, config).await? else {
            debug!("memory backend '{}' declined for agent '{}'", kind, agent_id);
            return Ok(None);
        };

        let handle = Arc::new(
            FallbackBackend::new(primary, kind, Some(self.fallback_factory(config)))
                .with_eviction(self.evictor(key.clone())),
        );
        lock(&self.entries).insert(key, Arc::clone(&handle));
        debug!("cached memory backend '{}' for agent '{}'", kind, agent_id);

        Ok(Some(handle))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Whether a live entry exists for the key.
    pub fn contains(&self, key: &CacheKey) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Close and drop every entry.
    pub async fn close_all(&self) -> Result<()> {
        let handles: Vec<_> = lock(&self.entries).drain().map(|(_, h)| h).collect();

        let mut first_error = None;
        for handle in handles {
            if let Err(err) = handle.close().await {
                debug!("closing cached memory backend: {}", err);
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<Arc<FallbackBackend>> {
        lock(&self.entries).get(key).cloned()
    }

    fn fallback_factory(&self, config: &ResolvedBackendConfig) -> FallbackFactory {
        let factory = Arc::clone(&self.factory);
        let config = config.clone();
        Arc::new(move || {
            let factory = Arc::clone(&factory);
            let config = config.clone();
            async move { factory.create_fallback(&config).await }.boxed()
        })
    }

    fn evictor(&self, key: CacheKey) -> EvictFn {
        let entries: Weak<Entries> = Arc::downgrade(&self.entries);
        Box::new(move || {
            let Some(entries) = entries.upgrade() else {
                return;
            };
            if lock(&entries).remove(&key).is_some() {
                debug!("evicted memory backend '{}' for agent '{}'", key.kind, key.agent_id);
            }
        })
    }
}
