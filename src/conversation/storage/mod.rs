//! Storage backends for conversation and message records.

pub mod memory_store;
pub mod sqlite_store;

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use crate::conversation::core::errors::{StoreError, StoreResult};
use crate::conversation::core::ids::ConversationId;
use crate::conversation::core::types::{Conversation, Message};

pub use memory_store::MemoryConversationStore;
pub use sqlite_store::SqliteConversationStore;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Time budget of one service operation.
///
/// Reads are abandoned once it passes. Writes carry it into the backend, which
/// rolls back instead of committing when it has passed, so a reported timeout
/// never leaves a record behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
    budget: Duration,
}

impl Deadline {
    /// Deadline `budget` from now. A budget too large to represent never expires.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
            budget,
        }
    }

    /// Budget the deadline was created with.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// The error reported once the deadline has passed.
    #[must_use]
    pub const fn exceeded(&self) -> StoreError {
        StoreError::Timeout(self.budget)
    }

    /// Fail with [`StoreError::Timeout`] if the deadline has passed.
    ///
    /// # Errors
    /// Returns `Timeout` when expired.
    pub fn check(&self) -> StoreResult<()> {
        if self.expired() {
            Err(self.exceeded())
        } else {
            Ok(())
        }
    }

    /// Run a read, abandoning it when the deadline passes.
    ///
    /// # Errors
    /// Returns `Timeout` when the deadline passes first, or the read's own error.
    pub async fn bound<T, F>(self, op: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match self.at {
            Some(at) => tokio::time::timeout_at(tokio::time::Instant::from_std(at), op)
                .await
                .map_err(|_| self.exceeded())?,
            None => op.await,
        }
    }
}

/// Outcome of [`ConversationBackend::insert_message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageInsert {
    /// The message was stored.
    Inserted,
    /// The referenced conversation does not exist; nothing was stored.
    ConversationMissing,
}

/// Conversation storage backend.
///
/// Implementations own their records and must be safe to share across
/// request handlers.
pub trait ConversationBackend: Send + Sync {
    /// List every stored conversation, in no particular order.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_conversations(&self) -> StoreFuture<'_, StoreResult<Vec<Conversation>>>;

    /// Get a conversation by ID.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_conversation(
        &self,
        id: ConversationId,
    ) -> StoreFuture<'_, StoreResult<Option<Conversation>>>;

    /// Persist a new conversation unless `deadline` has passed by commit time.
    ///
    /// # Errors
    /// Returns an error if storage access fails or the ID already exists, and
    /// `Timeout` (with nothing stored) once `deadline` has passed.
    fn insert_conversation(
        &self,
        conversation: Conversation,
        deadline: Deadline,
    ) -> StoreFuture<'_, StoreResult<()>>;

    /// Persist a new message, checking that its conversation exists in the
    /// same atomic step as the insert.
    ///
    /// # Errors
    /// Returns an error if storage access fails or the ID already exists, and
    /// `Timeout` (with nothing stored) once `deadline` has passed.
    fn insert_message(
        &self,
        message: Message,
        deadline: Deadline,
    ) -> StoreFuture<'_, StoreResult<MessageInsert>>;

    /// List the messages of a conversation, in no particular order.
    ///
    /// Returns `None` when the conversation does not exist.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> StoreFuture<'_, StoreResult<Option<Vec<Message>>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_expires_immediately() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.expired());
        assert!(matches!(deadline.check(), Err(StoreError::Timeout(d)) if d == Duration::ZERO));
    }

    #[test]
    fn test_unrepresentable_budget_never_expires() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(!deadline.expired());
        assert!(deadline.check().is_ok());
        assert_eq!(deadline.budget(), Duration::MAX);
    }

    #[tokio::test]
    async fn test_bound_abandons_slow_reads() {
        let deadline = Deadline::after(Duration::from_millis(10));
        let result: StoreResult<()> = deadline.bound(std::future::pending()).await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));

        let fast = Deadline::after(Duration::from_secs(5));
        assert_eq!(fast.bound(async { Ok(7) }).await.unwrap(), 7);
    }
}
