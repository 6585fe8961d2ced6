//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::Identity;
use crate::db::{Role, User};
use crate::message::{DestroyReason, Label, Message, ReadOutcome, SentEntry, Tombstone};

/// Success envelope: `{"data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Public view of a user.
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// Register/login response.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    /// Bearer token.
    pub token: String,
    /// Always `Bearer`.
    pub token_type: &'static str,
    /// Token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserInfo,
}

/// Current caller (`/auth/me`, `/users/me`).
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
}

impl From<Identity> for MeResponse {
    fn from(identity: Identity) -> Self {
        Self {
            user_id: identity.user_id,
            email: identity.email,
            role: identity.role,
        }
    }
}

/// A stored message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub subject: String,
    /// Absent once the message has been destroyed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub is_read: bool,
    pub label: Label,
    pub read_limit: i64,
    pub read_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            subject: message.subject,
            body: Some(message.body),
            is_read: message.is_read,
            label: message.label,
            read_limit: message.read_limit,
            read_count: message.read_count,
            expires_at: message.expires_at,
            created_at: message.created_at,
        }
    }
}

/// Result of `GET /messages/:id`.
#[derive(Debug, Serialize)]
pub struct ReadMessageResponse {
    pub message: MessageResponse,
    /// True when this read used up the read limit and the message is gone.
    /// The body is withheld in that case.
    pub deleted: bool,
}

impl From<ReadOutcome> for ReadMessageResponse {
    fn from(outcome: ReadOutcome) -> Self {
        match outcome {
            ReadOutcome::Viewed(m) | ReadOutcome::Read(m) => Self {
                message: m.into(),
                deleted: false,
            },
            ReadOutcome::Destroyed(m) => {
                let mut message = MessageResponse::from(m);
                message.body = None;
                Self {
                    message,
                    deleted: true,
                }
            }
        }
    }
}

/// What the sender still sees of a destroyed message.
#[derive(Debug, Serialize)]
pub struct DestroyedMessageResponse {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub subject: String,
    pub reason: DestroyReason,
    pub created_at: DateTime<Utc>,
    pub destroyed_at: DateTime<Utc>,
}

impl From<Tombstone> for DestroyedMessageResponse {
    fn from(tombstone: Tombstone) -> Self {
        Self {
            id: tombstone.message_id,
            sender_id: tombstone.sender_id,
            receiver_id: tombstone.receiver_id,
            subject: tombstone.subject,
            reason: tombstone.reason,
            created_at: tombstone.created_at,
            destroyed_at: tombstone.destroyed_at,
        }
    }
}

/// One entry of the sent view, tagged with `"status": "live" | "destroyed"`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SentItemResponse {
    Live(MessageResponse),
    Destroyed(DestroyedMessageResponse),
}

impl From<SentEntry> for SentItemResponse {
    fn from(entry: SentEntry) -> Self {
        match entry {
            SentEntry::Live(message) => SentItemResponse::Live(message.into()),
            SentEntry::Destroyed(tombstone) => SentItemResponse::Destroyed(tombstone.into()),
        }
    }
}

/// Result of `POST /messages/cleanup`.
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tombstone() -> Tombstone {
        let now = Utc::now();
        Tombstone {
            message_id: 4,
            sender_id: 1,
            receiver_id: 2,
            subject: "gone".to_string(),
            reason: DestroyReason::ReadLimit,
            created_at: now,
            destroyed_at: now,
        }
    }

    #[test]
    fn test_sent_item_is_tagged() {
        let json = serde_json::to_value(SentItemResponse::from(SentEntry::Destroyed(tombstone())))
            .unwrap();
        assert_eq!(json["status"], "destroyed");
        assert_eq!(json["id"], 4);
        assert_eq!(json["subject"], "gone");
        assert_eq!(json["reason"], "read_limit");
        assert!(json.get("body").is_none());
    }

    fn message(read_count: i64) -> Message {
        let now = Utc::now();
        Message {
            id: 7,
            sender_id: 1,
            receiver_id: 2,
            subject: "secret".to_string(),
            body: "burn after reading".to_string(),
            is_read: true,
            label: Label::Inbox,
            read_limit: 1,
            read_count,
            expires_at: Some(now),
            created_at: now,
        }
    }

    #[test]
    fn test_read_response_withholds_destroyed_body() {
        let json =
            serde_json::to_value(ReadMessageResponse::from(ReadOutcome::Destroyed(message(1))))
                .unwrap();
        assert_eq!(json["deleted"], true);
        assert_eq!(json["message"]["subject"], "secret");
        assert!(json["message"].get("body").is_none());

        let json = serde_json::to_value(ReadMessageResponse::from(ReadOutcome::Read(message(0))))
            .unwrap();
        assert_eq!(json["deleted"], false);
        assert_eq!(json["message"]["body"], "burn after reading");
    }

    #[test]
    fn test_me_response_shape() {
        let json = serde_json::to_value(MeResponse {
            user_id: 9,
            email: "a@x.com".to_string(),
            role: Role::Moderator,
        })
        .unwrap();
        assert_eq!(json["user_id"], 9);
        assert_eq!(json["role"], "moderator");
    }
}
