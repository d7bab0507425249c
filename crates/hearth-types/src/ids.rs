use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Prefix of synthetic conversation ids handed out for one-on-one chats
/// that have not been persisted yet.
pub const VIRTUAL_PREFIX: &str = "virtual-";

/// Opaque family identity. Scopes broadcast rooms, the group chat, polls
/// and alerts. Never interchangeable with a user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FamilyId(String);

impl FamilyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid chat reference: {0}")]
pub struct ChatRefError(pub String);

/// Reference to a conversation as seen by clients.
///
/// `Persisted` carries the stored chat id. `Virtual` carries the id of the
/// counterpart user of a one-on-one chat that only exists at read time; on
/// the wire it is rendered as `virtual-<counterpart id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatRef {
    Persisted(Uuid),
    Virtual(Uuid),
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persisted(id) => write!(f, "{}", id),
            Self::Virtual(counterpart) => write!(f, "{}{}", VIRTUAL_PREFIX, counterpart),
        }
    }
}

impl FromStr for ChatRef {
    type Err = ChatRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |raw: &str| raw.parse::<Uuid>().map_err(|_| ChatRefError(s.to_string()));
        match s.strip_prefix(VIRTUAL_PREFIX) {
            Some(counterpart) => Ok(Self::Virtual(parse(counterpart)?)),
            None => Ok(Self::Persisted(parse(s)?)),
        }
    }
}

impl Serialize for ChatRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChatRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
