// File: src/conversation/core/ids.rs

//! Identifier types for conversations and messages.
//!
//! Every identifier is a `UUIDv7` tagged with the entity type it names and
//! rendered as `<prefix>_<suffix>`, where the suffix is the 26-character
//! lowercase Crockford base32 encoding of the 128 UUID bits:
//!
//! ```text
//! conversation_01j9x4m8q6f3r2k7t5v0w1y9zc
//! message_01j9x4m9a2b7c3d5e6f8g0h1jk
//! ```
//!
//! The first suffix character only carries the top 3 bits of the UUID, so it
//! is always in `0..=7`. Parsing is strict: wrong prefix, wrong length, or any
//! character outside the alphabet is rejected.
//!
//! Time-ordering of the underlying `UUIDv7` gives good insert locality, but
//! nothing in the crate depends on IDs being lexically sortable.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Crockford base32 alphabet (lowercase, no `i`, `l`, `o`, `u`).
const ALPHABET: &[u8; 32] = b"0123456789abcdefghjkmnpqrstvwxyz";

/// Length of the encoded suffix that follows `<prefix>_`.
pub const SUFFIX_LEN: usize = 26;

/// Errors returned when parsing a typed identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// The identifier does not start with `<prefix>_`.
    #[error("expected identifier prefixed with `{expected}_`")]
    WrongPrefix {
        /// Prefix the parser was looking for.
        expected: &'static str,
    },
    /// The suffix is not exactly [`SUFFIX_LEN`] characters.
    #[error("identifier suffix must be {SUFFIX_LEN} characters, got {got}")]
    InvalidLength {
        /// Actual suffix length in bytes.
        got: usize,
    },
    /// The suffix contains a character outside the base32 alphabet.
    #[error("identifier contains invalid character {ch:?} at index {index}")]
    InvalidChar {
        /// The offending character.
        ch: char,
        /// Its byte offset inside the suffix.
        index: usize,
    },
    /// The suffix encodes more than 128 bits.
    #[error("identifier suffix overflows 128 bits")]
    Overflow,
}

#[allow(clippy::cast_possible_truncation)]
fn encode_suffix(uuid: Uuid) -> String {
    let value = uuid.as_u128();
    (0..SUFFIX_LEN)
        .map(|position| {
            let shift = 5 * (SUFFIX_LEN - 1 - position);
            // masked to 5 bits
            let digit = ((value >> shift) & 0x1f) as usize;
            char::from(ALPHABET[digit])
        })
        .collect()
}

fn decode_suffix(suffix: &str) -> Result<Uuid, IdParseError> {
    if suffix.len() != SUFFIX_LEN {
        return Err(IdParseError::InvalidLength { got: suffix.len() });
    }

    let mut value: u128 = 0;
    for (index, byte) in suffix.bytes().enumerate() {
        let digit = ALPHABET
            .iter()
            .position(|&candidate| candidate == byte)
            .ok_or(IdParseError::InvalidChar {
                ch: char::from(byte),
                index,
            })?;
        if index == 0 && digit > 7 {
            return Err(IdParseError::Overflow);
        }
        value = (value << 5) | digit as u128;
    }

    Ok(Uuid::from_u128(value))
}

/// Declare a prefixed identifier newtype with a consistent API.
macro_rules! define_typed_id {
    (
        $(#[$meta:meta])*
        $name:ident,
        prefix = $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Uuid);

        impl $name {
            /// Type tag rendered in front of the encoded UUID.
            pub const PREFIX: &'static str = $prefix;

            /// Generate a fresh identifier.
            #[inline]
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID.
            #[inline]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying UUID.
            #[inline]
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, encode_suffix(self.0))
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let suffix = s
                    .strip_prefix(Self::PREFIX)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .ok_or(IdParseError::WrongPrefix {
                        expected: Self::PREFIX,
                    })?;
                decode_suffix(suffix).map(Self)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_string()
            }
        }
    };
}

define_typed_id!(
    /// Identifier of a conversation (`conversation_...`).
    ConversationId,
    prefix = "conversation"
);

define_typed_id!(
    /// Identifier of a message (`message_...`).
    MessageId,
    prefix = "message"
);

// ===== Rusqlite integration ================================================

mod rusqlite_impl {
    use super::{ConversationId, MessageId};

    use rusqlite::types::{
        FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef,
    };

    macro_rules! impl_rusqlite_typed_id {
        ($t:ty) => {
            impl ToSql for $t {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    // Stored in rendered form so rows stay readable in the sqlite shell
                    Ok(ToSqlOutput::Owned(Value::Text(self.to_string())))
                }
            }

            impl FromSql for $t {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    let text = value.as_str()?;
                    text.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
                }
            }
        };
    }

    impl_rusqlite_typed_id!(ConversationId);
    impl_rusqlite_typed_id!(MessageId);
}
