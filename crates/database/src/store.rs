use crate::error::DbError;
use async_trait::async_trait;
use core_types::{PositionKey, SignalRecord};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Remembers the last signal acted on per key so a restart or the next tick does not
/// act on it twice.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn load(&self, key: &PositionKey) -> Result<Option<SignalRecord>, DbError>;

    /// Replaces any record already stored for `key`.
    async fn save(&self, key: &PositionKey, record: &SignalRecord) -> Result<(), DbError>;
}

/// Process-local store. Forgets everything on restart.
#[derive(Debug, Default)]
pub struct InMemorySignalStore {
    records: RwLock<HashMap<PositionKey, SignalRecord>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn load(&self, key: &PositionKey) -> Result<Option<SignalRecord>, DbError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn save(&self, key: &PositionKey, record: &SignalRecord) -> Result<(), DbError> {
        self.records.write().await.insert(key.clone(), record.clone());
        Ok(())
    }
}
