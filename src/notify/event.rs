//! New-message notification event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Topic every new-message notification is published on.
pub const NOTIFICATION_TOPIC: &str = "mail_notifications";

/// Routing key carried with new-message notifications.
pub const NEW_MESSAGE_ROUTING_KEY: &str = "new_message";

/// Event emitted after a message is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessageNotification {
    pub message_id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    /// RFC 3339 on the wire.
    pub timestamp: DateTime<Utc>,
}

impl NewMessageNotification {
    /// Notification for a freshly stored message.
    pub fn for_message(message: &Message) -> Self {
        Self {
            message_id: message.id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            timestamp: message.created_at,
        }
    }
}
