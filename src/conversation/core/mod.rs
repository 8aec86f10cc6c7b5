//! Core conversation types, identifiers, and errors.

pub mod errors;
pub mod ids;
pub mod params;
pub mod types;

pub use errors::{
    ConversationError, ConversationResult, FieldViolation, StoreError, StoreResult,
    ValidationError,
};
pub use ids::{ConversationId, IdParseError, MessageId};
pub use params::{AddMessageParams, StartParams};
pub use types::{
    Channel, Conversation, ConversationStatus, ListResponse, MAX_METADATA_ENTRIES, Message,
    Metadata, UnknownVariant,
};
