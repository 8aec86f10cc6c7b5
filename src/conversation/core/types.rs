//! Conversation and message records.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::core::ids::{ConversationId, MessageId};

/// Caller-supplied string annotations attached to a record.
pub type Metadata = HashMap<String, String>;

/// Upper bound on metadata entries accepted at creation.
pub const MAX_METADATA_ENTRIES: usize = 20;

/// Error returned when parsing an unknown enum tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownVariant {
    /// Enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Medium through which a conversation happens.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Web chat widget.
    Web,
    /// Email thread.
    Email,
}

impl Channel {
    /// All accepted channels.
    pub const ALL: [Self; 2] = [Self::Web, Self::Email];

    /// Stable tag used on the wire and in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "channel",
                value: s.to_string(),
            })
    }
}

/// Lifecycle marker of a conversation.
///
/// Only `Active` is ever assigned here; transitions belong to whatever
/// drives the conversation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Watched but not yet engaged.
    Observing,
    /// In progress.
    Active,
    /// Stopped by a participant.
    Cancelled,
    /// Completed normally.
    Finished,
    /// Ended because of an error.
    Failed,
}

impl ConversationStatus {
    /// Stable tag used on the wire and in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Observing => "observing",
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "observing" => Ok(Self::Observing),
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            _ => Err(UnknownVariant {
                kind: "conversation status",
                value: s.to_string(),
            }),
        }
    }
}

/// A customer interaction on a channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier.
    pub id: ConversationId,
    /// Customer that started the conversation.
    pub customer_id: String,
    /// Where the conversation happens.
    pub channel: Channel,
    /// Free-form annotations.
    pub metadata: Metadata,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last mutation time; equals `created` since records are never updated.
    pub updated: DateTime<Utc>,
    /// Lifecycle marker.
    pub status: ConversationStatus,
}

/// A single utterance within a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// Message text.
    pub body: String,
    /// Author identifier.
    pub participant_id: String,
    /// Author kind (e.g. `customer`, `agent`); not constrained.
    pub participant_type: String,
    /// Free-form annotations.
    pub metadata: Metadata,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last mutation time; equals `created`.
    pub updated: DateTime<Utc>,
}

/// Envelope for collection responses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    /// The listed records.
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}
