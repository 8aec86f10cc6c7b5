//! Conversation tracking for customer support.
//!
//! This module is organized into:
//! - `core`: Records, typed IDs, request params, and errors
//! - `storage`: The backend trait with in-memory and `SQLite` stores
//! - `service`: Validation and orchestration over a backend

pub mod core;
pub mod service;
pub mod storage;

pub use core::{
    AddMessageParams, Channel, Conversation, ConversationError, ConversationId,
    ConversationResult, ConversationStatus, ListResponse, Message, MessageId, Metadata,
    StartParams, StoreError, ValidationError,
};
pub use service::{ConversationService, DEFAULT_OPERATION_TIMEOUT};
pub use storage::{
    ConversationBackend, Deadline, MemoryConversationStore, MessageInsert,
    SqliteConversationStore, StoreFuture,
};
