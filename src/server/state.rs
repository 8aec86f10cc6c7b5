//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::conversation::core::errors::StoreResult;
use crate::conversation::service::ConversationService;
use crate::conversation::storage::{
    ConversationBackend, MemoryConversationStore, SqliteConversationStore,
};

/// Shared application state.
pub struct AppState {
    /// Conversation operations.
    pub conversations: ConversationService,
}

impl AppState {
    /// Wrap an existing service.
    #[must_use]
    pub fn new(conversations: ConversationService) -> Arc<Self> {
        Arc::new(Self { conversations })
    }

    /// Build state with the backend selected by `storage`.
    ///
    /// # Errors
    /// Returns an error if the `SQLite` database cannot be opened.
    pub async fn from_config(storage: &StorageConfig) -> StoreResult<Arc<Self>> {
        let backend: Arc<dyn ConversationBackend> = match storage.backend {
            StorageBackend::Memory => Arc::new(MemoryConversationStore::new()),
            StorageBackend::Sqlite => {
                Arc::new(SqliteConversationStore::open(&storage.sqlite_path).await?)
            }
        };
        tracing::info!(backend = %storage.backend, "storage ready");

        Ok(Self::new(ConversationService::new(
            backend,
            storage.operation_timeout(),
        )))
    }
}
