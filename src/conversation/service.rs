//! Conversation service: validation, ID generation, and storage delegation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::conversation::core::errors::{ConversationError, ConversationResult, ValidationError};
use crate::conversation::core::ids::{ConversationId, MessageId};
use crate::conversation::core::params::{AddMessageParams, StartParams};
use crate::conversation::core::types::{Conversation, ConversationStatus, Message};
use crate::conversation::storage::{
    ConversationBackend, Deadline, MemoryConversationStore, MessageInsert,
};

/// Default deadline for a single service operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the conversation domain rules on top of a pluggable backend.
///
/// Every operation runs under one [`Deadline`] of `operation_timeout`. Reads
/// are abandoned when it passes; writes are handed the deadline and refuse to
/// commit after it, so a `Timeout` error always means nothing was stored.
#[derive(Clone)]
pub struct ConversationService {
    backend: Arc<dyn ConversationBackend>,
    operation_timeout: Duration,
}

impl ConversationService {
    /// Wrap `backend`, bounding each operation by `operation_timeout`.
    #[must_use]
    pub fn new(backend: Arc<dyn ConversationBackend>, operation_timeout: Duration) -> Self {
        Self {
            backend,
            operation_timeout,
        }
    }

    /// Service over a fresh [`MemoryConversationStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryConversationStore::new()),
            DEFAULT_OPERATION_TIMEOUT,
        )
    }

    /// All conversations, oldest first.
    ///
    /// # Errors
    /// Returns `Internal` if storage fails.
    pub async fn list(&self) -> ConversationResult<Vec<Conversation>> {
        let mut conversations = self
            .deadline()
            .bound(self.backend.list_conversations())
            .await?;
        conversations.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        debug!(count = conversations.len(), "listed conversations");
        Ok(conversations)
    }

    /// Fetch one conversation.
    ///
    /// # Errors
    /// Returns `NotFound` if `id` names no conversation, `Internal` if storage fails.
    pub async fn get(&self, id: &str) -> ConversationResult<Conversation> {
        self.fetch(id, self.deadline()).await
    }

    /// Start a new active conversation.
    ///
    /// # Errors
    /// Returns `Validation` for malformed params, `Internal` if storage fails.
    pub async fn start(&self, params: StartParams) -> ConversationResult<Conversation> {
        let deadline = self.deadline();
        let channel = params.validate().map_err(log_rejection)?;

        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::generate(),
            customer_id: params.customer_id,
            channel,
            metadata: params.metadata.unwrap_or_default(),
            created: now,
            updated: now,
            status: ConversationStatus::Active,
        };

        self.backend
            .insert_conversation(conversation.clone(), deadline)
            .await?;
        info!(
            conversation_id = %conversation.id,
            channel = %conversation.channel,
            "started conversation"
        );
        Ok(conversation)
    }

    /// Append a message to an existing conversation.
    ///
    /// # Errors
    /// Returns `NotFound` if the conversation does not exist, `Validation` for
    /// malformed params, `Internal` if storage fails.
    pub async fn add_message(
        &self,
        conversation_id: &str,
        params: AddMessageParams,
    ) -> ConversationResult<Message> {
        let deadline = self.deadline();
        let conversation = self.fetch(conversation_id, deadline).await?;
        params.validate().map_err(log_rejection)?;

        let now = Utc::now();
        let message = Message {
            id: MessageId::generate(),
            conversation_id: conversation.id,
            body: params.body,
            participant_id: params.participant_id,
            participant_type: params.participant_type,
            metadata: params.metadata.unwrap_or_default(),
            created: now,
            updated: now,
        };

        match self
            .backend
            .insert_message(message.clone(), deadline)
            .await?
        {
            MessageInsert::Inserted => {
                info!(
                    conversation_id = %message.conversation_id,
                    message_id = %message.id,
                    "added message"
                );
                Ok(message)
            }
            MessageInsert::ConversationMissing => {
                Err(ConversationError::NotFound(conversation_id.to_string()))
            }
        }
    }

    /// Messages of an existing conversation, oldest first.
    ///
    /// # Errors
    /// Returns `NotFound` if the conversation does not exist, `Internal` if storage fails.
    pub async fn list_messages(&self, conversation_id: &str) -> ConversationResult<Vec<Message>> {
        let id = parse_conversation_id(conversation_id)?;
        let mut messages = self
            .deadline()
            .bound(self.backend.list_messages(id))
            .await?
            .ok_or_else(|| ConversationError::NotFound(conversation_id.to_string()))?;
        messages.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(messages)
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.operation_timeout)
    }

    async fn fetch(&self, id: &str, deadline: Deadline) -> ConversationResult<Conversation> {
        let conversation_id = parse_conversation_id(id)?;
        deadline
            .bound(self.backend.get_conversation(conversation_id))
            .await?
            .ok_or_else(|| ConversationError::NotFound(id.to_string()))
    }
}

fn parse_conversation_id(raw: &str) -> ConversationResult<ConversationId> {
    raw.parse()
        .map_err(|_| ConversationError::NotFound(raw.to_string()))
}

fn log_rejection(err: ValidationError) -> ValidationError {
    warn!(error = %err, "rejected request");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::core::errors::{StoreError, StoreResult};
    use crate::conversation::core::types::{Channel, MAX_METADATA_ENTRIES, Metadata};
    use crate::conversation::storage::{SqliteConversationStore, StoreFuture};

    fn oversized_metadata() -> Metadata {
        (0..=MAX_METADATA_ENTRIES)
            .map(|i| (format!("k{i}"), "v".to_string()))
            .collect()
    }

    async fn services() -> Vec<ConversationService> {
        let sqlite = SqliteConversationStore::open_in_memory().await.unwrap();
        vec![
            ConversationService::in_memory(),
            ConversationService::new(Arc::new(sqlite), DEFAULT_OPERATION_TIMEOUT),
        ]
    }

    #[tokio::test]
    async fn test_start_list_add_message_scenario() {
        for service in services().await {
            let conversation = service
                .start(StartParams::new("cust-1", "web"))
                .await
                .unwrap();
            assert_eq!(conversation.status, ConversationStatus::Active);
            assert_eq!(conversation.channel, Channel::Web);
            assert!(conversation.metadata.is_empty());
            assert_eq!(conversation.created, conversation.updated);
            assert!(conversation.id.to_string().starts_with("conversation_"));

            assert_eq!(service.list().await.unwrap(), vec![conversation.clone()]);

            let message = service
                .add_message(
                    &conversation.id.to_string(),
                    AddMessageParams::new("hi", "cust-1", "customer"),
                )
                .await
                .unwrap();
            assert_eq!(message.conversation_id, conversation.id);
            assert!(message.id.to_string().starts_with("message_"));
            assert!(message.metadata.is_empty());

            let messages = service
                .list_messages(&conversation.id.to_string())
                .await
                .unwrap();
            assert_eq!(messages, vec![message]);
        }
    }

    #[tokio::test]
    async fn test_get_round_trips_started_conversation() {
        for service in services().await {
            let metadata = Metadata::from([("plan".to_string(), "pro".to_string())]);
            let started = service
                .start(StartParams::new("cust=2", "email").with_metadata(metadata))
                .await
                .unwrap();
            let fetched = service.get(&started.id.to_string()).await.unwrap();
            assert_eq!(fetched, started);
        }
    }

    #[tokio::test]
    async fn test_invalid_start_creates_nothing() {
        for service in services().await {
            let existing = service
                .start(StartParams::new("cust-1", "web"))
                .await
                .unwrap();

            let cases = [
                StartParams::new("bad id!", "web"),
                StartParams::new("cust-1", "sms"),
                StartParams::new("cust-1", "web").with_metadata(oversized_metadata()),
            ];
            for params in cases {
                let err = service.start(params).await.unwrap_err();
                assert!(matches!(err, ConversationError::Validation(_)));
            }

            assert_eq!(service.list().await.unwrap(), vec![existing]);
        }
    }

    #[tokio::test]
    async fn test_identical_starts_get_distinct_ids() {
        let service = ConversationService::in_memory();
        let first = service.start(StartParams::new("cust-1", "web")).await.unwrap();
        let second = service.start(StartParams::new("cust-1", "web")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(service.list().await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_not_found() {
        for service in services().await {
            let missing = ConversationId::generate().to_string();

            assert!(matches!(
                service.get(&missing).await,
                Err(ConversationError::NotFound(id)) if id == missing
            ));
            assert!(matches!(
                service.get("not-an-id").await,
                Err(ConversationError::NotFound(_))
            ));

            let err = service
                .add_message(&missing, AddMessageParams::new("hi", "cust-1", "customer"))
                .await
                .unwrap_err();
            assert!(matches!(err, ConversationError::NotFound(_)));
            assert!(matches!(
                service.list_messages(&missing).await,
                Err(ConversationError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_add_message_validates_metadata() {
        let service = ConversationService::in_memory();
        let conversation = service
            .start(StartParams::new("cust-1", "email"))
            .await
            .unwrap();
        let id = conversation.id.to_string();

        let err = service
            .add_message(
                &id,
                AddMessageParams::new("hi", "cust-1", "customer")
                    .with_metadata(oversized_metadata()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConversationError::Validation(ref inner) if inner.has_field("metadata")
        ));
        assert!(service.list_messages(&id).await.unwrap().is_empty());
    }

    /// Reads never answer; writes take longer than their deadline and then
    /// refuse to commit.
    struct StalledBackend;

    impl ConversationBackend for StalledBackend {
        fn list_conversations(&self) -> StoreFuture<'_, StoreResult<Vec<Conversation>>> {
            Box::pin(std::future::pending())
        }

        fn get_conversation(
            &self,
            _id: ConversationId,
        ) -> StoreFuture<'_, StoreResult<Option<Conversation>>> {
            Box::pin(std::future::pending())
        }

        fn insert_conversation(
            &self,
            _conversation: Conversation,
            deadline: Deadline,
        ) -> StoreFuture<'_, StoreResult<()>> {
            Box::pin(async move {
                tokio::time::sleep(deadline.budget() * 2).await;
                deadline.check()
            })
        }

        fn insert_message(
            &self,
            _message: Message,
            deadline: Deadline,
        ) -> StoreFuture<'_, StoreResult<MessageInsert>> {
            Box::pin(async move {
                tokio::time::sleep(deadline.budget() * 2).await;
                deadline.check().map(|()| MessageInsert::Inserted)
            })
        }

        fn list_messages(
            &self,
            _conversation_id: ConversationId,
        ) -> StoreFuture<'_, StoreResult<Option<Vec<Message>>>> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn test_stalled_storage_times_out() {
        let timeout = Duration::from_millis(20);
        let service = ConversationService::new(Arc::new(StalledBackend), timeout);

        let err = service.list().await.unwrap_err();
        assert!(matches!(
            err,
            ConversationError::Internal(StoreError::Timeout(t)) if t == timeout
        ));

        let missing = ConversationId::generate().to_string();
        let err = service
            .add_message(&missing, AddMessageParams::new("hi", "cust-1", "customer"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::Internal(StoreError::Timeout(_))));

        let err = service
            .start(StartParams::new("cust-1", "web"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::Internal(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_timed_out_writes_leave_sqlite_untouched() {
        let store = Arc::new(SqliteConversationStore::open_in_memory().await.unwrap());
        let hasty = ConversationService::new(store.clone(), Duration::from_nanos(1));
        let patient = ConversationService::new(store, DEFAULT_OPERATION_TIMEOUT);

        let err = hasty
            .start(StartParams::new("cust-1", "web"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::Internal(StoreError::Timeout(_))));
        assert!(patient.list().await.unwrap().is_empty());

        let conversation = patient
            .start(StartParams::new("cust-1", "web"))
            .await
            .unwrap();
        let id = conversation.id.to_string();
        let err = hasty
            .add_message(&id, AddMessageParams::new("hi", "cust-1", "customer"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::Internal(StoreError::Timeout(_))));
        assert!(patient.list_messages(&id).await.unwrap().is_empty());
        assert_eq!(patient.list().await.unwrap(), vec![conversation]);
    }
}
