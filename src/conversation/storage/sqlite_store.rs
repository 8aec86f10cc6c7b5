//! SQLite-backed conversation store.
//!
//! Two tables, `conversations` and `messages`, with
//! `messages.conversation_id` referencing `conversations.id`. Metadata is a
//! JSON text column. Timestamps are RFC 3339 text with nanosecond precision,
//! which keeps them exact on round-trip and lexically ordered.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::conversation::core::errors::{StoreError, StoreResult};
use crate::conversation::core::ids::{ConversationId, MessageId};
use crate::conversation::core::types::{Conversation, Message, Metadata, UnknownVariant};
use crate::conversation::storage::{ConversationBackend, Deadline, MessageInsert, StoreFuture};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        customer_id TEXT NOT NULL,
        channel TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL,
        created TEXT NOT NULL,
        updated TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL REFERENCES conversations (id),
        body TEXT NOT NULL,
        participant_id TEXT NOT NULL,
        participant_type TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created TEXT NOT NULL,
        updated TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_conversation_created
        ON messages (conversation_id, created);";

const SELECT_CONVERSATION: &str =
    "SELECT id, customer_id, channel, metadata, status, created, updated FROM conversations";

const SELECT_MESSAGE: &str = "SELECT id, conversation_id, body, participant_id, participant_type, \
     metadata, created, updated FROM messages";

/// Raw conversation row, decoded outside the connection thread.
struct ConversationRow {
    id: ConversationId,
    customer_id: String,
    channel: String,
    metadata: String,
    status: String,
    created: String,
    updated: String,
}

impl ConversationRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            customer_id: row.get(1)?,
            channel: row.get(2)?,
            metadata: row.get(3)?,
            status: row.get(4)?,
            created: row.get(5)?,
            updated: row.get(6)?,
        })
    }

    fn decode(self) -> StoreResult<Conversation> {
        let id = self.id;
        let invalid =
            |err: UnknownVariant| StoreError::InvalidRecord(format!("conversation {id}: {err}"));
        Ok(Conversation {
            id,
            customer_id: self.customer_id,
            channel: self.channel.parse().map_err(invalid)?,
            metadata: serde_json::from_str(&self.metadata)?,
            status: self.status.parse().map_err(invalid)?,
            created: decode_timestamp(&self.created)?,
            updated: decode_timestamp(&self.updated)?,
        })
    }
}

/// Raw message row, decoded outside the connection thread.
struct MessageRow {
    id: MessageId,
    conversation_id: ConversationId,
    body: String,
    participant_id: String,
    participant_type: String,
    metadata: String,
    created: String,
    updated: String,
}

impl MessageRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            body: row.get(2)?,
            participant_id: row.get(3)?,
            participant_type: row.get(4)?,
            metadata: row.get(5)?,
            created: row.get(6)?,
            updated: row.get(7)?,
        })
    }

    fn decode(self) -> StoreResult<Message> {
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            body: self.body,
            participant_id: self.participant_id,
            participant_type: self.participant_type,
            metadata: serde_json::from_str(&self.metadata)?,
            created: decode_timestamp(&self.created)?,
            updated: decode_timestamp(&self.updated)?,
        })
    }
}

fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| StoreError::InvalidRecord(format!("invalid timestamp {raw:?}: {err}")))
}

fn encode_metadata(metadata: &Metadata) -> StoreResult<String> {
    Ok(serde_json::to_string(metadata)?)
}

/// `SQLite` implementation of [`ConversationBackend`].
pub struct SqliteConversationStore {
    conn: Connection,
}

impl SqliteConversationStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(path).await?;
        Self::with_connection(conn).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }
}

impl ConversationBackend for SqliteConversationStore {
    fn list_conversations(&self) -> StoreFuture<'_, StoreResult<Vec<Conversation>>> {
        Box::pin(async move {
            let rows = self
                .conn
                .call(|conn| {
                    let mut stmt = conn.prepare(SELECT_CONVERSATION)?;
                    let rows = stmt
                        .query_map([], ConversationRow::read)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            rows.into_iter().map(ConversationRow::decode).collect()
        })
    }

    fn get_conversation(
        &self,
        id: ConversationId,
    ) -> StoreFuture<'_, StoreResult<Option<Conversation>>> {
        Box::pin(async move {
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!("{SELECT_CONVERSATION} WHERE id = ?1"),
                            rusqlite::params![id],
                            ConversationRow::read,
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            row.map(ConversationRow::decode).transpose()
        })
    }

    fn insert_conversation(
        &self,
        conversation: Conversation,
        deadline: Deadline,
    ) -> StoreFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let metadata = encode_metadata(&conversation.metadata)?;
            let created = encode_timestamp(&conversation.created);
            let updated = encode_timestamp(&conversation.updated);

            let committed = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    tx.execute(
                        "INSERT INTO conversations
                         (id, customer_id, channel, metadata, status, created, updated)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        rusqlite::params![
                            conversation.id,
                            conversation.customer_id,
                            conversation.channel.as_str(),
                            metadata,
                            conversation.status.as_str(),
                            created,
                            updated
                        ],
                    )?;
                    // Dropping the transaction rolls the insert back.
                    if deadline.expired() {
                        return Ok(false);
                    }
                    tx.commit()?;
                    Ok(true)
                })
                .await?;

            if committed { Ok(()) } else { Err(deadline.exceeded()) }
        })
    }

    fn insert_message(
        &self,
        message: Message,
        deadline: Deadline,
    ) -> StoreFuture<'_, StoreResult<MessageInsert>> {
        Box::pin(async move {
            let metadata = encode_metadata(&message.metadata)?;
            let created = encode_timestamp(&message.created);
            let updated = encode_timestamp(&message.updated);

            let outcome = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let exists: bool = tx.query_row(
                        "SELECT EXISTS (SELECT 1 FROM conversations WHERE id = ?1)",
                        rusqlite::params![message.conversation_id],
                        |row| row.get(0),
                    )?;
                    if !exists {
                        return Ok(Some(MessageInsert::ConversationMissing));
                    }

                    tx.execute(
                        "INSERT INTO messages
                         (id, conversation_id, body, participant_id, participant_type,
                          metadata, created, updated)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        rusqlite::params![
                            message.id,
                            message.conversation_id,
                            message.body,
                            message.participant_id,
                            message.participant_type,
                            metadata,
                            created,
                            updated
                        ],
                    )?;
                    if deadline.expired() {
                        return Ok(None);
                    }
                    tx.commit()?;
                    Ok(Some(MessageInsert::Inserted))
                })
                .await?;

            outcome.ok_or_else(|| deadline.exceeded())
        })
    }

    fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> StoreFuture<'_, StoreResult<Option<Vec<Message>>>> {
        Box::pin(async move {
            let rows = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let exists: bool = tx.query_row(
                        "SELECT EXISTS (SELECT 1 FROM conversations WHERE id = ?1)",
                        rusqlite::params![conversation_id],
                        |row| row.get(0),
                    )?;
                    if !exists {
                        return Ok(None);
                    }

                    let mut stmt = tx.prepare(&format!(
                        "{SELECT_MESSAGE} WHERE conversation_id = ?1 ORDER BY created, id"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![conversation_id], MessageRow::read)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    drop(stmt);
                    tx.commit()?;
                    Ok(Some(rows))
                })
                .await?;

            rows.map(|rows| rows.into_iter().map(MessageRow::decode).collect())
                .transpose()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::conversation::core::types::{Channel, ConversationStatus};

    fn conversation() -> Conversation {
        let now = Utc::now();
        Conversation {
            id: ConversationId::generate(),
            customer_id: "cust-1".to_string(),
            channel: Channel::Email,
            metadata: HashMap::from([("source".to_string(), "landing".to_string())]),
            created: now,
            updated: now,
            status: ConversationStatus::Active,
        }
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    async fn count_rows(store: &SqliteConversationStore, table: &'static str) -> i64 {
        store
            .conn
            .call(move |conn| {
                let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
                Ok(count)
            })
            .await
            .unwrap()
    }

    fn message(conversation_id: ConversationId, body: &str) -> Message {
        let now = Utc::now();
        Message {
            id: MessageId::generate(),
            conversation_id,
            body: body.to_string(),
            participant_id: "agent-7".to_string(),
            participant_type: "agent".to_string(),
            metadata: Metadata::new(),
            created: now,
            updated: now,
        }
    }

    #[tokio::test]
    async fn test_conversation_round_trip() {
        let store = SqliteConversationStore::open_in_memory().await.unwrap();
        let conv = conversation();
        store.insert_conversation(conv.clone(), deadline()).await.unwrap();

        let loaded = store.get_conversation(conv.id).await.unwrap();
        assert_eq!(loaded, Some(conv.clone()));
        assert_eq!(store.list_conversations().await.unwrap(), vec![conv]);
        assert!(store
            .get_conversation(ConversationId::generate())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_conversation_fails() {
        let store = SqliteConversationStore::open_in_memory().await.unwrap();
        let conv = conversation();
        store.insert_conversation(conv.clone(), deadline()).await.unwrap();
        assert!(store.insert_conversation(conv, deadline()).await.is_err());
        assert_eq!(store.list_conversations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_message_for_unknown_conversation_is_not_stored() {
        let store = SqliteConversationStore::open_in_memory().await.unwrap();
        let orphan = ConversationId::generate();

        let outcome = store.insert_message(message(orphan, "hello?"), deadline()).await.unwrap();
        assert_eq!(outcome, MessageInsert::ConversationMissing);

        assert_eq!(count_rows(&store, "messages").await, 0);
        assert!(store.list_messages(orphan).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_messages_round_trip_in_creation_order() {
        let store = SqliteConversationStore::open_in_memory().await.unwrap();
        let conv = conversation();
        store.insert_conversation(conv.clone(), deadline()).await.unwrap();

        let first = message(conv.id, "first");
        let second = message(conv.id, "second");
        for msg in [&second, &first] {
            assert_eq!(
                store.insert_message(msg.clone(), deadline()).await.unwrap(),
                MessageInsert::Inserted
            );
        }

        let listed = store.list_messages(conv.id).await.unwrap().unwrap();
        assert_eq!(listed, vec![first, second]);
    }

    #[tokio::test]
    async fn test_expired_deadline_rolls_back_writes() {
        let store = SqliteConversationStore::open_in_memory().await.unwrap();
        let expired = Deadline::after(Duration::ZERO);
        let conv = conversation();

        let err = store
            .insert_conversation(conv.clone(), expired)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert_eq!(count_rows(&store, "conversations").await, 0);

        store.insert_conversation(conv.clone(), deadline()).await.unwrap();
        let err = store
            .insert_message(message(conv.id, "late"), expired)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert_eq!(count_rows(&store, "messages").await, 0);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.sqlite");
        let conv = conversation();
        let msg = message(conv.id, "persisted");

        {
            let store = SqliteConversationStore::open(&path).await.unwrap();
            store.insert_conversation(conv.clone(), deadline()).await.unwrap();
            store.insert_message(msg.clone(), deadline()).await.unwrap();
        }

        let reopened = SqliteConversationStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_conversation(conv.id).await.unwrap(), Some(conv.clone()));
        assert_eq!(reopened.list_messages(conv.id).await.unwrap(), Some(vec![msg]));
    }

    #[test]
    fn test_timestamp_encoding_is_exact() {
        let now = Utc::now();
        let encoded = encode_timestamp(&now);
        assert!(encoded.ends_with('Z'));
        assert_eq!(decode_timestamp(&encoded).unwrap(), now);
        assert!(decode_timestamp("yesterday").is_err());
    }
}
