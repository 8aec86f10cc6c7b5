//! In-memory conversation store.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::conversation::core::errors::{StoreError, StoreResult};
use crate::conversation::core::ids::ConversationId;
use crate::conversation::core::types::{Conversation, Message};
use crate::conversation::storage::{ConversationBackend, Deadline, MessageInsert, StoreFuture};

/// Thread-safe in-memory backend. Records live as long as the store.
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: DashMap<ConversationId, Conversation>,
    messages: DashMap<ConversationId, Vec<Message>>,
}

impl MemoryConversationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationBackend for MemoryConversationStore {
    fn list_conversations(&self) -> StoreFuture<'_, StoreResult<Vec<Conversation>>> {
        Box::pin(async move {
            Ok(self
                .conversations
                .iter()
                .map(|entry| entry.value().clone())
                .collect())
        })
    }

    fn get_conversation(
        &self,
        id: ConversationId,
    ) -> StoreFuture<'_, StoreResult<Option<Conversation>>> {
        Box::pin(async move { Ok(self.conversations.get(&id).map(|entry| entry.value().clone())) })
    }

    fn insert_conversation(
        &self,
        conversation: Conversation,
        deadline: Deadline,
    ) -> StoreFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            deadline.check()?;
            match self.conversations.entry(conversation.id) {
                Entry::Occupied(_) => Err(StoreError::DuplicateId(conversation.id.to_string())),
                Entry::Vacant(slot) => {
                    slot.insert(conversation);
                    Ok(())
                }
            }
        })
    }

    fn insert_message(
        &self,
        message: Message,
        deadline: Deadline,
    ) -> StoreFuture<'_, StoreResult<MessageInsert>> {
        Box::pin(async move {
            // Holding the conversation guard keeps the check and the push in one step.
            let Some(_conversation) = self.conversations.get(&message.conversation_id) else {
                return Ok(MessageInsert::ConversationMissing);
            };

            let mut thread = self.messages.entry(message.conversation_id).or_default();
            if thread.iter().any(|existing| existing.id == message.id) {
                return Err(StoreError::DuplicateId(message.id.to_string()));
            }
            deadline.check()?;
            thread.push(message);
            Ok(MessageInsert::Inserted)
        })
    }

    fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> StoreFuture<'_, StoreResult<Option<Vec<Message>>>> {
        Box::pin(async move {
            if !self.conversations.contains_key(&conversation_id) {
                return Ok(None);
            }
            let messages = self
                .messages
                .get(&conversation_id)
                .map(|thread| thread.value().clone())
                .unwrap_or_default();
            Ok(Some(messages))
        })
    }
}
