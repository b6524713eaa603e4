use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rise_core::config::VectorStoreConfig;
use tokio::sync::OnceCell;
use tracing::info;

use crate::retrieval::{EmbeddingClient, QdrantStore, RetrievalError, VectorStore};

type Slot<T> = Arc<OnceCell<Arc<T>>>;

/// Lazily built, shared client handles keyed by name.
///
/// The first `get_or_try_init` for a key runs the initializer while concurrent callers for
/// the same key wait on it; other keys proceed independently. A failed initialization leaves
/// the slot empty so the next call retries.
pub struct ClientRegistry<T: ?Sized> {
    slots: Mutex<HashMap<String, Slot<T>>>,
}

impl<T: ?Sized> Default for ClientRegistry<T> {
    fn default() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }
}

impl<T: ?Sized + Send + Sync> ClientRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Slot<T> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.to_string()).or_default().clone()
    }

    pub async fn get_or_try_init<F, Fut, E>(&self, key: &str, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, E>>,
    {
        let slot = self.slot(key);
        slot.get_or_try_init(init).await.cloned()
    }

    /// The handle for `key` if it has already been built.
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).and_then(|slot| slot.get().cloned())
    }

    pub fn evict(&self, key: &str) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(key).is_some_and(|slot| slot.initialized())
    }

    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let initialized = slots.values().filter(|slot| slot.initialized()).count();
        slots.clear();
        initialized
    }

    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
pub trait VectorStoreFactory: Send + Sync {
    async fn create(&self, collection: &str) -> Result<Arc<dyn VectorStore>, RetrievalError>;
}

pub struct QdrantStoreFactory {
    config: VectorStoreConfig,
    embedder: Arc<dyn EmbeddingClient>,
}

impl QdrantStoreFactory {
    pub fn new(config: VectorStoreConfig, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self { config, embedder }
    }
}

#[async_trait]
impl VectorStoreFactory for QdrantStoreFactory {
    async fn create(&self, collection: &str) -> Result<Arc<dyn VectorStore>, RetrievalError> {
        let store = QdrantStore::new(&self.config, collection, Arc::clone(&self.embedder))?;
        Ok(Arc::new(store))
    }
}

/// Vector-store handles per collection, built on first use.
pub struct VectorStores {
    registry: ClientRegistry<dyn VectorStore>,
    factory: Arc<dyn VectorStoreFactory>,
}

impl VectorStores {
    pub fn new(factory: Arc<dyn VectorStoreFactory>) -> Self {
        Self { registry: ClientRegistry::new(), factory }
    }

    pub async fn get(&self, collection: &str) -> Result<Arc<dyn VectorStore>, RetrievalError> {
        let factory = Arc::clone(&self.factory);
        self.registry
            .get_or_try_init(collection, || async move {
                let store = factory.create(collection).await?;
                info!(event_name = "agent.vector_store.created", collection, "vector store ready");
                Ok(store)
            })
            .await
    }

    /// Builds the handle ahead of the first request.
    pub async fn warm(&self, collection: &str) -> Result<(), RetrievalError> {
        self.get(collection).await.map(|_| ())
    }

    pub fn evict(&self, collection: &str) -> bool {
        self.registry.evict(collection)
    }

    pub fn clear(&self) -> usize {
        self.registry.clear()
    }

    pub fn cached(&self) -> usize {
        self.registry.len()
    }
}
