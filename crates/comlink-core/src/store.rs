//! The comment-store capability and an in-memory implementation.

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use crate::error::StoreError;

/// Operations the authoring and hover logic need from a comment store.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Initializes the project store.
    async fn init(&self) -> Result<(), StoreError>;

    /// Stores `body` and returns its new identifier.
    async fn create(&self, body: &str) -> Result<String, StoreError>;

    /// Fetches the comment for `id`; `None` when the store has no record.
    async fn fetch(&self, id: &str) -> Result<Option<String>, StoreError>;

    /// Deletes the comment for `id`.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Whether round-trips can currently succeed.
    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    initialized: bool,
    next_id: u64,
    comments: FxHashMap<String, String>,
    log: Vec<String>,
}

/// Comment store held in memory. Identifiers are sequential integers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Protocol lines this store would have received, in order.
    pub fn requests(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock()
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn init(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.log.push(">init".to_string());
        inner.log.push("*".to_string());
        inner.initialized = true;
        Ok(())
    }

    async fn create(&self, body: &str) -> Result<String, StoreError> {
        if body.contains(['\n', '\r']) {
            return Err(StoreError::MultilinePayload);
        }
        let mut inner = self.lock();
        inner.log.push(format!("~{body}"));
        inner.next_id += 1;
        let id = inner.next_id.to_string();
        inner.comments.insert(id.clone(), body.to_string());
        Ok(id)
    }

    async fn fetch(&self, id: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.lock();
        inner.log.push(format!("@{id}"));
        Ok(inner.comments.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.log.push(format!("&{id}"));
        inner.comments.remove(id);
        Ok(())
    }
}
