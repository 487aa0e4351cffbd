/// Root collection holding one document per user.
pub const USERS_COLLECTION: &str = "users";

/// Root collection holding one document per conversation.
pub const CHATS_COLLECTION: &str = "chats";

/// Sub-collection of a conversation holding its messages.
pub const MESSAGES_COLLECTION: &str = "messages";

/// Separator between the two sorted participant ids of a conversation id.
pub const CONVERSATION_ID_SEPARATOR: char = '_';

/// Prefix of the call channel derived from a conversation id.
pub const CALL_CHANNEL_PREFIX: &str = "call_";

/// Prefix of the per-participant unread counter field on a conversation.
pub const UNREAD_FIELD_PREFIX: &str = "unreadCount_";

/// Largest identifier set a single `In` filter may carry.
pub const MAX_IN_FILTER_VALUES: usize = 30;

/// Sender name snapshotted when a user has neither display name nor email.
pub const FALLBACK_SENDER_NAME: &str = "User";

/// Document field names
pub mod fields {
    // users/{uid}
    pub const UID: &str = "uid";
    pub const EMAIL: &str = "email";
    pub const DISPLAY_NAME: &str = "displayName";
    pub const PHOTO_URL: &str = "photoURL";
    pub const ONLINE: &str = "online";
    pub const LAST_SEEN: &str = "lastSeen";
    pub const BIO: &str = "bio";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";

    // chats/{chatId}
    pub const PARTICIPANTS: &str = "participants";
    pub const LAST_MESSAGE: &str = "lastMessage";
    pub const LAST_MESSAGE_TIME: &str = "lastMessageTime";
    pub const LAST_MESSAGE_SENDER_ID: &str = "lastMessageSenderId";

    // chats/{chatId}/messages/{messageId}
    pub const TEXT: &str = "text";
    pub const SENDER_ID: &str = "senderId";
    pub const SENDER_NAME: &str = "senderName";
    pub const SENDER_PHOTO: &str = "senderPhoto";
    pub const TIMESTAMP: &str = "timestamp";
    pub const READ_BY: &str = "readBy";
}
