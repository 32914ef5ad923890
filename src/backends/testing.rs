//! In-memory backends for exercising the coordination layer in tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;

use crate::backends::fallback::FallbackFactory;
use crate::backends::traits::{
    BackendStatus, EmbeddingProbe, MemoryBackend, ProviderKind, ReadFileRequest, ReadFileResult,
    SearchOptions, SearchResult, SyncRequest,
};
use crate::cache::BackendFactory;
use crate::discovery::ResolvedBackendConfig;
use crate::error::{MemoryError, Result};

#[derive(Default)]
struct Calls {
    search: AtomicUsize,
    read: AtomicUsize,
    sync: AtomicUsize,
    close: AtomicUsize,
}

#[derive(Default)]
struct Faults {
    search: Option<String>,
    read: Option<String>,
}

struct Inner {
    kind: ProviderKind,
    label: &'static str,
    supports_sync: AtomicBool,
    calls: Calls,
    faults: Mutex<Faults>,
    session_keys: Mutex<Vec<Option<String>>>,
}

/// A scriptable backend. Clones share call counters and faults.
#[derive(Clone)]
pub struct MockBackend {
    inner: Arc<Inner>,
}

impl MockBackend {
    pub fn new(kind: ProviderKind, label: &'static str) -> Self {
        Self {
            inner: Arc::new(Inner {
                kind,
                label,
                supports_sync: AtomicBool::new(false),
                calls: Calls::default(),
                faults: Mutex::new(Faults::default()),
                session_keys: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_sync(self) -> Self {
        self.inner.supports_sync.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_searches(&self, message: &str) {
        self.inner.faults.lock().unwrap().search = Some(message.to_string());
    }

    pub fn fail_reads(&self, message: &str) {
        self.inner.faults.lock().unwrap().read = Some(message.to_string());
    }

    pub fn recover(&self) {
        *self.inner.faults.lock().unwrap() = Faults::default();
    }

    pub fn search_calls(&self) -> usize {
        self.inner.calls.search.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.inner.calls.read.load(Ordering::SeqCst)
    }

    pub fn sync_calls(&self) -> usize {
        self.inner.calls.sync.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.inner.calls.close.load(Ordering::SeqCst)
    }

    pub fn session_keys(&self) -> Vec<Option<String>> {
        self.inner.session_keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemoryBackend for MockBackend {
    async fn search(&self, _query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        self.inner.calls.search.fetch_add(1, Ordering::SeqCst);
        self.inner
            .session_keys
            .lock()
            .unwrap()
            .push(opts.session_key.clone());

        if let Some(message) = self.inner.faults.lock().unwrap().search.clone() {
            return Err(MemoryError::backend(message));
        }
        Ok(vec![SearchResult::new(
            format!("{}.md", self.inner.label),
            1,
            1,
            1.0,
            self.inner.label,
        )])
    }

    async fn read_file(&self, request: &ReadFileRequest) -> Result<ReadFileResult> {
        self.inner.calls.read.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.inner.faults.lock().unwrap().read.clone() {
            return Err(MemoryError::backend(message));
        }
        Ok(ReadFileResult {
            text: format!("{}:{}", self.inner.label, request.rel_path),
            path: request.rel_path.clone(),
        })
    }

    fn status(&self) -> BackendStatus {
        let mut status = BackendStatus::new(self.inner.kind, self.inner.label);
        status
            .custom
            .insert("mock".to_string(), self.inner.label.into());
        status
    }

    fn supports_sync(&self) -> bool {
        self.inner.supports_sync.load(Ordering::SeqCst)
    }

    async fn sync(&self, _request: &SyncRequest) -> Result<()> {
        self.inner.calls.sync.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn probe_embedding_availability(&self) -> EmbeddingProbe {
        EmbeddingProbe::available()
    }

    async fn probe_vector_availability(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<()> {
        self.inner.calls.close.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.inner.label
    }
}

/// A fallback factory yielding `backend` (or declining), with a build counter.
pub fn fallback_factory(backend: Option<MockBackend>) -> (FallbackFactory, Arc<AtomicUsize>) {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    let factory: FallbackFactory = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let backend = backend
            .clone()
            .map(|b| Arc::new(b) as Arc<dyn MemoryBackend>);
        async move { Ok::<_, MemoryError>(backend) }.boxed()
    });
    (factory, builds)
}

/// A [`BackendFactory`] handing out [`MockBackend`]s.
#[derive(Default)]
pub struct MockFactory {
    attempts: AtomicUsize,
    decline: AtomicBool,
    search_fault: Mutex<Option<String>>,
    primaries: Mutex<Vec<MockBackend>>,
    fallbacks: Mutex<Vec<MockBackend>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decline(&self, decline: bool) {
        self.decline.store(decline, Ordering::SeqCst);
    }

    /// Primaries built from now on fail every search with `message`.
    pub fn fail_primary_searches(&self, message: &str) {
        *self.search_fault.lock().unwrap() = Some(message.to_string());
    }

    /// Construction attempts, including declined ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Primaries actually constructed.
    pub fn created(&self) -> usize {
        self.primaries.lock().unwrap().len()
    }

    pub fn primaries(&self) -> Vec<MockBackend> {
        self.primaries.lock().unwrap().clone()
    }

    pub fn fallbacks(&self) -> Vec<MockBackend> {
        self.fallbacks.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendFactory for MockFactory {
    async fn create(
        &self,
        kind: ProviderKind,
        _config: &ResolvedBackendConfig,
    ) -> Result<Option<Arc<dyn MemoryBackend>>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.decline.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let backend = MockBackend::new(kind, "primary");
        if let Some(message) = self.search_fault.lock().unwrap().as_deref() {
            backend.fail_searches(message);
        }
        self.primaries.lock().unwrap().push(backend.clone());
        Ok(Some(Arc::new(backend) as Arc<dyn MemoryBackend>))
    }

    async fn create_fallback(
        &self,
        _config: &ResolvedBackendConfig,
    ) -> Result<Option<Arc<dyn MemoryBackend>>> {
        let backend = MockBackend::new(ProviderKind::Builtin, "fallback");
        self.fallbacks.lock().unwrap().push(backend.clone());
        Ok(Some(Arc::new(backend) as Arc<dyn MemoryBackend>))
    }
}
