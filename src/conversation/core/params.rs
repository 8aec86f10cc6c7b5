//! Request parameters and their validation rules.
//!
//! Validation is pure: it never generates identifiers or touches storage, and
//! it reports every failing field at once rather than stopping at the first.

use serde::{Deserialize, Deserializer, Serialize};

use crate::conversation::core::errors::{FieldViolation, ValidationError};
use crate::conversation::core::types::{Channel, MAX_METADATA_ENTRIES, Metadata};

/// Parameters for starting a conversation.
///
/// Missing or `null` fields deserialize to empty values so that absence is
/// reported by [`StartParams::validate`] instead of failing body decoding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartParams {
    /// Requesting customer; charset `[A-Za-z0-9\-_+=]`.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub customer_id: String,
    /// `web` or `email`.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub channel: String,
    /// Optional annotations, at most [`MAX_METADATA_ENTRIES`].
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl StartParams {
    /// Build params with no metadata.
    #[must_use]
    pub fn new(customer_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            channel: channel.into(),
            metadata: None,
        }
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check every field and return the parsed channel.
    ///
    /// # Errors
    /// Returns `ValidationError` listing each of `customer_id`, `channel`,
    /// `metadata` that is invalid.
    pub fn validate(&self) -> Result<Channel, ValidationError> {
        let mut violations = Vec::new();

        if self.customer_id.is_empty() {
            violations.push(FieldViolation::new("customer_id", "is required"));
        } else if !is_valid_customer_id(&self.customer_id) {
            violations.push(FieldViolation::new(
                "customer_id",
                "may only contain letters, digits and - _ + =",
            ));
        }

        let channel = match self.channel.as_str() {
            "" => {
                violations.push(FieldViolation::new("channel", "is required"));
                None
            }
            raw => {
                let parsed = raw.parse::<Channel>().ok();
                if parsed.is_none() {
                    violations.push(FieldViolation::new("channel", "must be one of: web, email"));
                }
                parsed
            }
        };

        check_metadata(self.metadata.as_ref(), &mut violations);

        ValidationError::check(violations)?;
        channel.ok_or_else(|| ValidationError::single("channel", "is required"))
    }
}

/// Parameters for appending a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMessageParams {
    /// Message text.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    /// Author identifier.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub participant_id: String,
    /// Author kind.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub participant_type: String,
    /// Optional annotations, at most [`MAX_METADATA_ENTRIES`].
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl AddMessageParams {
    /// Build params with no metadata.
    #[must_use]
    pub fn new(
        body: impl Into<String>,
        participant_id: impl Into<String>,
        participant_type: impl Into<String>,
    ) -> Self {
        Self {
            body: body.into(),
            participant_id: participant_id.into(),
            participant_type: participant_type.into(),
            metadata: None,
        }
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check the metadata bound. Body and participant fields are free-form.
    ///
    /// # Errors
    /// Returns `ValidationError` naming `metadata` when it has too many entries.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        check_metadata(self.metadata.as_ref(), &mut violations);
        ValidationError::check(violations)
    }
}

/// Whether `value` is a non-empty string over `[A-Za-z0-9\-_+=]`.
#[must_use]
pub fn is_valid_customer_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '+' | '='))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn check_metadata(metadata: Option<&Metadata>, violations: &mut Vec<FieldViolation>) {
    if let Some(metadata) = metadata {
        if metadata.len() > MAX_METADATA_ENTRIES {
            violations.push(FieldViolation::new(
                "metadata",
                format!(
                    "must have at most {MAX_METADATA_ENTRIES} entries, got {}",
                    metadata.len()
                ),
            ));
        }
    }
}
