//! Fallback backend wrapper for memsearch.
//!
//! Wraps a primary provider and permanently switches to a lazily built
//! fallback the first time a primary search fails. The switch is one-way for
//! the lifetime of the wrapper: the primary is closed and never consulted
//! again, even if it would have recovered.
//!
//! The wrapper also owns cache eviction: whoever caches it supplies a
//! callback, and the wrapper fires it at most once, either on degrade or on
//! explicit close.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::backends::traits::{
    BackendStatus, EmbeddingProbe, MemoryBackend, ProviderKind, ReadFileRequest, ReadFileResult,
    SearchOptions, SearchResult, SyncRequest,
};
use crate::error::{MemoryError, Result};
use crate::util::lock;

/// Builds the fallback provider on demand.
///
/// `Ok(None)` means no fallback could be built this time; the wrapper retries
/// on the next call that needs it.
pub type FallbackFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Option<Arc<dyn MemoryBackend>>>> + Send + Sync>;

/// Invoked once when the wrapper should leave its cache slot.
pub type EvictFn = Box<dyn FnOnce() + Send>;

#[derive(Debug, Default)]
struct DegradeState {
    degraded: bool,
    last_error: Option<String>,
    /// Primary status captured at degrade time; the primary is closed afterwards.
    primary_status: Option<BackendStatus>,
    degraded_at: Option<DateTime<Utc>>,
}

/// A backend wrapper that degrades to a fallback after the primary fails.
pub struct FallbackBackend {
    primary: Arc<dyn MemoryBackend>,
    primary_kind: ProviderKind,
    factory: Option<FallbackFactory>,
    fallback: OnceCell<Arc<dyn MemoryBackend>>,
    state: Mutex<DegradeState>,
    primary_closed: AtomicBool,
    evicted: AtomicBool,
    on_evict: Mutex<Option<EvictFn>>,
}

impl FallbackBackend {
    /// Wrap `primary`. `factory` builds the fallback when first needed.
    pub fn new(
        primary: Arc<dyn MemoryBackend>,
        primary_kind: ProviderKind,
        factory: Option<FallbackFactory>,
    ) -> Self {
        Self {
            primary,
            primary_kind,
            factory,
            fallback: OnceCell::new(),
            state: Mutex::new(DegradeState::default()),
            primary_closed: AtomicBool::new(false),
            evicted: AtomicBool::new(false),
            on_evict: Mutex::new(None),
        }
    }

    /// Attach the eviction callback.
    pub fn with_eviction(self, on_evict: EvictFn) -> Self {
        *lock(&self.on_evict) = Some(on_evict);
        self
    }

    /// Kind of the wrapped primary.
    pub fn primary_kind(&self) -> ProviderKind {
        self.primary_kind
    }

    /// Whether the primary has failed and requests go to the fallback.
    pub fn is_degraded(&self) -> bool {
        lock(&self.state).degraded
    }

    /// The primary's failure message, once degraded.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.state).last_error.clone()
    }

    /// When the wrapper degraded.
    pub fn degraded_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.state).degraded_at
    }

    /// Whether the wrapper has left its cache slot, by degrade or close.
    ///
    /// A wrapper that never had a callback reports `false` until then.
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    /// Move to the degraded state.
    ///
    /// Only the first caller performs the transition side effects; concurrent
    /// or later calls are no-ops.
    fn degrade(&self, error: &MemoryError) {
        let reason = error.to_string();
        {
            let mut state = lock(&self.state);
            if state.degraded {
                return;
            }
            state.degraded = true;
            state.last_error = Some(reason.clone());
            state.primary_status = Some(self.primary.status());
            state.degraded_at = Some(Utc::now());
        }

        warn!(
            "memory backend '{}' failed, switching to fallback: {}",
            self.primary.name(),
            reason
        );

        self.close_primary_in_background();
        self.evict();
    }

    fn close_primary_in_background(&self) {
        if self.primary_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let primary = Arc::clone(&self.primary);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = primary.close().await {
                        debug!("closing failed memory backend '{}': {}", primary.name(), err);
                    }
                });
            }
            Err(_) => debug!(
                "no runtime to close memory backend '{}'",
                self.primary.name()
            ),
        }
    }

    fn evict(&self) {
        if self.evicted.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = lock(&self.on_evict).take();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Error raised when degraded and no fallback can serve the call.
    fn degraded_error(&self) -> MemoryError {
        let reason = self
            .last_error()
            .unwrap_or_else(|| "primary backend failed".to_string());
        MemoryError::unavailable(reason)
    }

    /// Get the fallback, building it on first use.
    ///
    /// Failed builds are not remembered.
    async fn fallback(&self) -> Option<Arc<dyn MemoryBackend>> {
        let factory = self.factory.as_ref()?;
        let built = self
            .fallback
            .get_or_try_init(|| async {
                match factory().await {
                    Ok(Some(backend)) => Ok(backend),
                    Ok(None) => Err(MemoryError::unavailable("fallback declined")),
                    Err(err) => Err(err),
                }
            })
            .await;

        match built {
            Ok(backend) => Some(Arc::clone(backend)),
            Err(err) => {
                warn!("memory fallback unavailable: {}", err);
                None
            }
        }
    }

    async fn require_fallback(&self) -> Result<Arc<dyn MemoryBackend>> {
        self.fallback().await.ok_or_else(|| self.degraded_error())
    }
}

impl fmt::Debug for FallbackBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackBackend")
            .field("primary", &self.primary.name())
            .field("primary_kind", &self.primary_kind)
            .field("degraded", &self.is_degraded())
            .field("fallback_built", &self.fallback.initialized())
            .finish()
    }
}

#[async_trait]
impl MemoryBackend for FallbackBackend {
    async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        if !self.is_degraded() {
            match self.primary.search(query, opts).await {
                Ok(results) => return Ok(results),
                Err(err) => self.degrade(&err),
            }
        }
        self.require_fallback().await?.search(query, opts).await
    }

    async fn read_file(&self, request: &ReadFileRequest) -> Result<ReadFileResult> {
        if !self.is_degraded() {
            return self.primary.read_file(request).await;
        }
        self.require_fallback().await?.read_file(request).await
    }

    fn status(&self) -> BackendStatus {
        let (degraded, reason, primary_status) = {
            let state = lock(&self.state);
            (
                state.degraded,
                state.last_error.clone().unwrap_or_default(),
                state.primary_status.clone(),
            )
        };

        if !degraded {
            return self.primary.status();
        }

        let base = match self.fallback.get() {
            Some(fallback) => fallback.status(),
            None => primary_status.unwrap_or_else(|| self.primary.status()),
        };
        base.with_fallback(self.primary_kind, reason)
    }

    fn supports_sync(&self) -> bool {
        if !self.is_degraded() {
            return self.primary.supports_sync();
        }
        self.fallback
            .get()
            .map(|f| f.supports_sync())
            .unwrap_or(false)
    }

    async fn sync(&self, request: &SyncRequest) -> Result<()> {
        if !self.is_degraded() {
            return self.primary.sync(request).await;
        }
        let fallback = self.require_fallback().await?;
        if !fallback.supports_sync() {
            return Ok(());
        }
        fallback.sync(request).await
    }

    async fn probe_embedding_availability(&self) -> EmbeddingProbe {
        if !self.is_degraded() {
            return self.primary.probe_embedding_availability().await;
        }
        match self.fallback().await {
            Some(fallback) => fallback.probe_embedding_availability().await,
            None => EmbeddingProbe::unavailable(self.degraded_error().to_string()),
        }
    }

    async fn probe_vector_availability(&self) -> bool {
        if !self.is_degraded() {
            return self.primary.probe_vector_availability().await;
        }
        match self.fallback().await {
            Some(fallback) => fallback.probe_vector_availability().await,
            None => false,
        }
    }

    async fn close(&self) -> Result<()> {
        let mut first_error = None;

        if !self.primary_closed.swap(true, Ordering::SeqCst) {
            if let Err(err) = self.primary.close().await {
                first_error = Some(err);
            }
        }
        if let Some(fallback) = self.fallback.get() {
            if let Err(err) = fallback.close().await {
                first_error.get_or_insert(err);
            }
        }

        self.evict();

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        self.primary.name()
    }
}
