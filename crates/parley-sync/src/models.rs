//! Typed views over user, conversation and message documents.
//!
//! Documents written by other clients may be missing fields or carry empty
//! strings; the parsers here apply the same fallbacks everywhere so the rest
//! of the crate never inspects raw JSON.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use parley_shared::constants::{fields, FALLBACK_SENDER_NAME, UNREAD_FIELD_PREFIX};
use parley_shared::{MessageId, UserId};
use parley_store::Document;

use crate::error::{ChatError, RecordKind, Result};

/// Name of the unread counter field belonging to `user`.
pub fn unread_field(user: &UserId) -> String {
    format!("{UNREAD_FIELD_PREFIX}{user}")
}

/// Convert a store commit timestamp (micros since epoch).
pub fn timestamp_from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros)
}

fn non_empty(doc: &Document, field: &str) -> Option<String> {
    doc.get_str(field)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn timestamp(doc: &Document, field: &str) -> Option<DateTime<Utc>> {
    doc.get_i64(field).and_then(timestamp_from_micros)
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl User {
    pub fn from_document(doc: &Document) -> Result<Self> {
        Ok(Self {
            id: UserId::new(doc.id.as_str())?,
            email: non_empty(doc, fields::EMAIL),
            display_name: non_empty(doc, fields::DISPLAY_NAME),
            photo_url: non_empty(doc, fields::PHOTO_URL),
            online: doc.get_bool(fields::ONLINE).unwrap_or(false),
            last_seen: timestamp(doc, fields::LAST_SEEN),
        })
    }

    /// Name shown in lists and matched by search: display name, email, then id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(self.id.as_str())
    }

    /// Name snapshotted onto outgoing messages.
    pub fn sender_name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(FALLBACK_SENDER_NAME)
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<UserId>,
    pub last_message: String,
    pub last_message_time: Option<DateTime<Utc>>,
    pub last_sender: Option<UserId>,
    unread: HashMap<UserId, u32>,
}

impl Conversation {
    /// Parse a conversation document. Participant ids that fail validation
    /// are dropped with a warning rather than failing the whole record.
    pub fn from_document(doc: &Document) -> Self {
        let participants = doc
            .get_str_array(fields::PARTICIPANTS)
            .into_iter()
            .filter_map(|raw| match UserId::new(raw) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(chat = %doc.id, error = %e, "skipping invalid participant");
                    None
                }
            })
            .collect();

        let unread = doc
            .data
            .iter()
            .filter_map(|(key, value)| {
                let uid = key.strip_prefix(UNREAD_FIELD_PREFIX)?;
                let uid = UserId::new(uid).ok()?;
                let count = value.as_u64().unwrap_or(0);
                Some((uid, u32::try_from(count).unwrap_or(u32::MAX)))
            })
            .collect();

        Self {
            id: doc.id.clone(),
            participants,
            last_message: doc.get_str(fields::LAST_MESSAGE).unwrap_or_default().to_string(),
            last_message_time: timestamp(doc, fields::LAST_MESSAGE_TIME),
            last_sender: doc
                .get_str(fields::LAST_MESSAGE_SENDER_ID)
                .and_then(|s| UserId::new(s).ok()),
            unread,
        }
    }

    /// The participant that is not `me`, if any.
    pub fn correspondent_of(&self, me: &UserId) -> Option<&UserId> {
        self.participants.iter().find(|p| *p != me)
    }

    /// Unread counter of `user`; a missing field counts as zero.
    pub fn unread_for(&self, user: &UserId) -> u32 {
        self.unread.get(user).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_photo: String,
    /// Store commit time; `None` only while a write is pending.
    pub timestamp: Option<DateTime<Utc>>,
    pub read_by: BTreeSet<UserId>,
}

impl Message {
    pub fn from_document(doc: &Document) -> Result<Self> {
        let malformed = |reason: &str| ChatError::Malformed {
            kind: RecordKind::Message,
            id: doc.id.clone(),
            reason: reason.to_string(),
        };

        let sender_id = doc
            .get_str(fields::SENDER_ID)
            .ok_or_else(|| malformed("missing senderId"))?;
        let sender_id = UserId::new(sender_id).map_err(|e| malformed(&e.to_string()))?;

        Ok(Self {
            id: MessageId(doc.id.clone()),
            text: doc.get_str(fields::TEXT).unwrap_or_default().to_string(),
            sender_id,
            sender_name: doc.get_str(fields::SENDER_NAME).unwrap_or_default().to_string(),
            sender_photo: doc.get_str(fields::SENDER_PHOTO).unwrap_or_default().to_string(),
            timestamp: timestamp(doc, fields::TIMESTAMP),
            read_by: doc
                .get_str_array(fields::READ_BY)
                .into_iter()
                .filter_map(|raw| UserId::new(raw).ok())
                .collect(),
        })
    }

    pub fn is_read_by(&self, user: &UserId) -> bool {
        self.read_by.contains(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn doc(id: &str, body: Value) -> Document {
        let data: Map<String, Value> = match body {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        Document {
            id: id.to_string(),
            data,
        }
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[test]
    fn test_user_label_fallbacks() {
        let named = User::from_document(&doc(
            "u1",
            json!({"displayName": "Ana", "email": "ana@example.com"}),
        ))
        .unwrap();
        assert_eq!(named.label(), "Ana");

        let email_only =
            User::from_document(&doc("u2", json!({"displayName": "", "email": "b@x.io"}))).unwrap();
        assert_eq!(email_only.label(), "b@x.io");
        assert_eq!(email_only.sender_name(), "b@x.io");

        let bare = User::from_document(&doc("u3", json!({}))).unwrap();
        assert_eq!(bare.label(), "u3");
        assert_eq!(bare.sender_name(), "User");
        assert!(!bare.online);
    }

    #[test]
    fn test_conversation_counters_and_correspondent() {
        let conv = Conversation::from_document(&doc(
            "alice_bob",
            json!({
                "participants": ["alice", "bob"],
                "lastMessage": "hey",
                "lastMessageTime": 1_700_000_000_000_000_i64,
                "lastMessageSenderId": "alice",
                "unreadCount_bob": 3,
                "unreadCount_alice": 0,
            }),
        ));

        assert_eq!(conv.correspondent_of(&uid("alice")), Some(&uid("bob")));
        assert_eq!(conv.unread_for(&uid("bob")), 3);
        assert_eq!(conv.unread_for(&uid("carol")), 0);
        assert_eq!(conv.last_sender, Some(uid("alice")));
        assert!(conv.last_message_time.is_some());
    }

    #[test]
    fn test_conversation_without_other_participant() {
        let conv = Conversation::from_document(&doc("solo", json!({"participants": ["alice"]})));
        assert!(conv.correspondent_of(&uid("alice")).is_none());
    }

    #[test]
    fn test_message_requires_sender() {
        let err = Message::from_document(&doc("m1", json!({"text": "hi"}))).unwrap_err();
        assert!(matches!(err, ChatError::Malformed { kind: RecordKind::Message, .. }));

        let msg = Message::from_document(&doc(
            "m2",
            json!({"text": "hi", "senderId": "alice", "readBy": ["alice"], "timestamp": 5}),
        ))
        .unwrap();
        assert!(msg.is_read_by(&uid("alice")));
        assert!(!msg.is_read_by(&uid("bob")));
    }
}
