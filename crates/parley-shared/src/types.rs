use serde::{Deserialize, Serialize};

use crate::constants::{CALL_CHANNEL_PREFIX, CONVERSATION_ID_SEPARATOR};
use crate::error::IdError;

// User identity = opaque auth-provider uid
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a raw uid.
    ///
    /// The conversation-id separator and the path delimiter are rejected so
    /// that two different pairs can never derive the same conversation id.
    pub fn new(raw: impl Into<String>) -> Result<Self, IdError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(IdError::Empty);
        }
        for reserved in [CONVERSATION_ID_SEPARATOR, '/'] {
            if raw.contains(reserved) {
                return Err(IdError::ReservedCharacter { id: raw, reserved });
            }
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the single conversation record shared by two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationId(String);

impl ConversationId {
    /// Derive the conversation id for an unordered pair.
    ///
    /// Both participants compute the same value independently:
    /// `for_pair(a, b) == for_pair(b, a)`.
    pub fn for_pair(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{lo}{CONVERSATION_ID_SEPARATOR}{hi}"))
    }

    /// Name of the call channel both participants join.
    pub fn call_channel(&self) -> String {
        format!("{CALL_CHANNEL_PREFIX}{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned message identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn is_video(self) -> bool {
        matches!(self, Self::Video)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[test]
    fn test_conversation_id_is_commutative() {
        let pairs = [
            ("alice", "bob"),
            ("Zed", "adam"),
            ("u1", "u10"),
            ("same-prefix", "same"),
        ];
        for (a, b) in pairs {
            assert_eq!(
                ConversationId::for_pair(&uid(a), &uid(b)),
                ConversationId::for_pair(&uid(b), &uid(a)),
            );
        }
    }

    #[test]
    fn test_conversation_id_sorts_participants() {
        let id = ConversationId::for_pair(&uid("bob"), &uid("alice"));
        assert_eq!(id.as_str(), "alice_bob");
        assert_eq!(id.call_channel(), "call_alice_bob");
    }

    #[test]
    fn test_user_id_rejects_reserved_characters() {
        assert_eq!(UserId::new(""), Err(IdError::Empty));
        assert!(matches!(
            UserId::new("a_b"),
            Err(IdError::ReservedCharacter { reserved: '_', .. })
        ));
        assert!(matches!(
            UserId::new("a/b"),
            Err(IdError::ReservedCharacter { reserved: '/', .. })
        ));
    }

    #[test]
    fn test_user_id_serde_validates() {
        let ok: UserId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(ok.as_str(), "alice");
        assert!(serde_json::from_str::<UserId>("\"a_b\"").is_err());
    }
}
