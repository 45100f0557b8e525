//! Event envelopes carried through the queue.
//!
//! An envelope is one of three closed variants discriminated by a `type`
//! field. Anything else coming off the queue decodes to [`Unroutable`]
//! instead of an envelope.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Privacy-safe user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Organization/instance identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl GroupId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A scalar trait value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraitValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Small mapping of non-identifying attributes.
pub type Traits = BTreeMap<String, TraitValue>;

impl From<&str> for TraitValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for TraitValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<bool> for TraitValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for TraitValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for TraitValue {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for TraitValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// The minimal `{name: id}` traits used for identify and group calls.
pub fn name_traits(name: &str) -> Traits {
    Traits::from([("name".to_string(), TraitValue::from(name))])
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Envelope {
    /// Update the user profile and tie it to its group.
    Identify {
        user_id: UserId,
        group_id: GroupId,
        traits: Traits,
    },
    /// Update the group profile.
    Group { group_id: GroupId, traits: Traits },
    /// Record a named action. The destination takes no event properties.
    Track { user_id: UserId, event: String },
}

impl Envelope {
    /// The discriminator value written to the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Identify { .. } => "identify",
            Self::Group { .. } => "group",
            Self::Track { .. } => "track",
        }
    }

    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Decode a queue message body.
    ///
    /// The discriminator is checked first so an unknown `type` is told
    /// apart from a known one with bad fields.
    pub fn decode(value: &serde_json::Value) -> Result<Self, Unroutable> {
        let kind = match value.get("type") {
            None | Some(serde_json::Value::Null) => return Err(Unroutable::MissingType),
            Some(serde_json::Value::String(kind)) => kind.as_str(),
            Some(other) => return Err(Unroutable::UnknownType(other.to_string())),
        };

        if !matches!(kind, "identify" | "group" | "track") {
            return Err(Unroutable::UnknownType(kind.to_string()));
        }

        serde_json::from_value(value.clone()).map_err(|e| Unroutable::Malformed {
            kind: kind.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Why a delivered message could not be turned into an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unroutable {
    MissingType,
    UnknownType(String),
    Malformed { kind: String, reason: String },
}

impl fmt::Display for Unroutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingType => f.write_str("payload has no type"),
            Self::UnknownType(kind) => write!(f, "unknown type {kind}"),
            Self::Malformed { kind, reason } => write!(f, "malformed {kind} payload: {reason}"),
        }
    }
}
