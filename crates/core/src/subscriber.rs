//! Subscriber identity.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Registry key for a subscriber: their username, or their numeric user id
/// when they have none.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(CompactString);

impl SubscriberId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(CompactString::new(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where notifications for a subscriber are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub id: SubscriberId,
    /// Chat the transport addresses messages to.
    pub chat_id: i64,
}

impl Recipient {
    pub fn new(id: impl Into<SubscriberId>, chat_id: i64) -> Self {
        Self {
            id: id.into(),
            chat_id,
        }
    }
}
