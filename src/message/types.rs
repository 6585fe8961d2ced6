//! Message types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Participants;
use crate::MailboxError;

/// Maximum length for message subject (in characters).
pub const MAX_SUBJECT_LENGTH: usize = 100;

/// Maximum length for message body (in characters).
pub const MAX_BODY_LENGTH: usize = 10_000;

/// User-controlled classification, independent of read state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// Default on delivery.
    #[default]
    Inbox,
    /// Marked as spam.
    Spam,
    /// Moved to trash.
    Trash,
}

impl Label {
    /// Stored and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Inbox => "inbox",
            Label::Spam => "spam",
            Label::Trash => "trash",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = MailboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbox" => Ok(Label::Inbox),
            "spam" => Ok(Label::Spam),
            "trash" => Ok(Label::Trash),
            _ => Err(MailboxError::Validation(format!(
                "invalid label {s:?}: must be one of inbox, spam, trash"
            ))),
        }
    }
}

/// Delivery state of a live message. `Deleted` messages have no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Not yet opened by the receiver.
    Unread,
    /// Opened at least once by the receiver.
    Read,
}

/// A stored message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message ID.
    pub id: i64,
    /// Sender user ID.
    pub sender_id: i64,
    /// Receiver user ID.
    pub receiver_id: i64,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
    /// Whether the receiver has opened it.
    pub is_read: bool,
    /// Current label.
    pub label: Label,
    /// Reads allowed before destruction; 0 means unlimited.
    pub read_limit: i64,
    /// Counted receiver reads: the first read, when `read_limit > 0`.
    pub read_count: i64,
    /// Set iff `read_limit > 0`.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the message was sent.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Current delivery state.
    pub fn state(&self) -> DeliveryState {
        if self.is_read {
            DeliveryState::Read
        } else {
            DeliveryState::Unread
        }
    }

    /// Whether reads count towards a limit.
    pub fn is_self_destructing(&self) -> bool {
        self.read_limit > 0
    }

    /// Reads left before destruction, or None if unlimited.
    pub fn remaining_reads(&self) -> Option<i64> {
        self.is_self_destructing()
            .then(|| (self.read_limit - self.read_count).max(0))
    }

    /// Whether the expiry horizon has passed as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

impl Participants for Message {
    fn sender_id(&self) -> i64 {
        self.sender_id
    }

    fn receiver_id(&self) -> i64 {
        self.receiver_id
    }
}

/// Request to send a message.
#[derive(Debug, Clone)]
pub struct SendMessage {
    /// Sender user ID.
    pub sender_id: i64,
    /// Receiver email (normalized before lookup).
    pub receiver_email: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
    /// Reads allowed before destruction; 0 means unlimited, negative is rejected.
    pub read_limit: i64,
}

impl SendMessage {
    /// Create a send request without a read limit.
    pub fn new(
        sender_id: i64,
        receiver_email: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender_id,
            receiver_email: receiver_email.into(),
            subject: subject.into(),
            body: body.into(),
            read_limit: 0,
        }
    }

    /// Set the read limit.
    pub fn with_read_limit(mut self, read_limit: i64) -> Self {
        self.read_limit = read_limit;
        self
    }
}

/// Row values for a message insert, after validation and receiver lookup.
#[derive(Debug, Clone)]
pub(crate) struct NewMessage {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub subject: String,
    pub body: String,
    pub read_limit: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Result of opening a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Returned as-is: caller is the sender, or an unlimited message was
    /// already read.
    Viewed(Message),
    /// The receiver's read was recorded; the message survives.
    Read(Message),
    /// The read reached the limit. The row is gone; this is its final
    /// snapshot (marked read, `read_count == read_limit`).
    Destroyed(Message),
}

impl ReadOutcome {
    /// The message snapshot carried by any outcome.
    pub fn message(&self) -> &Message {
        match self {
            ReadOutcome::Viewed(m) | ReadOutcome::Read(m) | ReadOutcome::Destroyed(m) => m,
        }
    }

    /// Whether this read destroyed the message.
    pub fn is_destroyed(&self) -> bool {
        matches!(self, ReadOutcome::Destroyed(_))
    }
}

/// Why a message was destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyReason {
    /// The receiver used up the read limit.
    ReadLimit,
    /// Removed by the expiry sweep.
    Expired,
}

impl DestroyReason {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DestroyReason::ReadLimit => "read_limit",
            DestroyReason::Expired => "expired",
        }
    }
}

impl FromStr for DestroyReason {
    type Err = MailboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read_limit" => Ok(DestroyReason::ReadLimit),
            "expired" => Ok(DestroyReason::Expired),
            _ => Err(MailboxError::Database(format!("unknown destroy reason {s:?}"))),
        }
    }
}

/// What remains of a destroyed message. The body is never kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    /// ID the message had.
    pub message_id: i64,
    /// Sender user ID.
    pub sender_id: i64,
    /// Receiver user ID.
    pub receiver_id: i64,
    /// Subject line.
    pub subject: String,
    /// Why it was destroyed.
    pub reason: DestroyReason,
    /// When the message was sent.
    pub created_at: DateTime<Utc>,
    /// When it was destroyed.
    pub destroyed_at: DateTime<Utc>,
}

impl Tombstone {
    /// Tombstone for `message` destroyed at `destroyed_at`.
    pub fn of(message: &Message, reason: DestroyReason, destroyed_at: DateTime<Utc>) -> Self {
        Self {
            message_id: message.id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            subject: message.subject.clone(),
            reason,
            created_at: message.created_at,
            destroyed_at,
        }
    }
}

impl Participants for Tombstone {
    fn sender_id(&self) -> i64 {
        self.sender_id
    }

    fn receiver_id(&self) -> i64 {
        self.receiver_id
    }
}

/// One row of the sender's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentEntry {
    /// Still stored.
    Live(Message),
    /// Destroyed; only the subject survives.
    Destroyed(Tombstone),
}

impl SentEntry {
    /// Message ID.
    pub fn id(&self) -> i64 {
        match self {
            SentEntry::Live(m) => m.id,
            SentEntry::Destroyed(t) => t.message_id,
        }
    }

    /// Subject line.
    pub fn subject(&self) -> &str {
        match self {
            SentEntry::Live(m) => &m.subject,
            SentEntry::Destroyed(t) => &t.subject,
        }
    }

    /// Send time.
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            SentEntry::Live(m) => m.created_at,
            SentEntry::Destroyed(t) => t.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(read_limit: i64, read_count: i64) -> Message {
        let now = Utc::now();
        Message {
            id: 1,
            sender_id: 10,
            receiver_id: 20,
            subject: "hi".to_string(),
            body: "body".to_string(),
            is_read: false,
            label: Label::Inbox,
            read_limit,
            read_count,
            expires_at: (read_limit > 0).then(|| now + Duration::hours(24)),
            created_at: now,
        }
    }

    #[test]
    fn test_label_parse() {
        assert_eq!("inbox".parse::<Label>().unwrap(), Label::Inbox);
        assert_eq!("spam".parse::<Label>().unwrap(), Label::Spam);
        assert_eq!("trash".parse::<Label>().unwrap(), Label::Trash);
        for bad in ["archive", "Inbox", "", "spam "] {
            assert!(matches!(bad.parse::<Label>(), Err(MailboxError::Validation(_))));
        }
    }

    #[test]
    fn test_label_default_is_inbox() {
        assert_eq!(Label::default(), Label::Inbox);
        assert_eq!(Label::Trash.to_string(), "trash");
    }

    #[test]
    fn test_remaining_reads() {
        assert_eq!(sample(0, 0).remaining_reads(), None);
        assert_eq!(sample(3, 1).remaining_reads(), Some(2));
        assert!(sample(3, 1).is_self_destructing());
    }

    #[test]
    fn test_is_expired() {
        let message = sample(1, 0);
        let expires_at = message.expires_at.unwrap();
        assert!(!message.is_expired(expires_at));
        assert!(message.is_expired(expires_at + Duration::milliseconds(1)));
        assert!(!sample(0, 0).is_expired(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn test_participants() {
        let message = sample(0, 0);
        assert!(message.involves(10));
        assert!(message.involves(20));
        assert!(!message.involves(30));
    }

    #[test]
    fn test_tombstone_drops_body() {
        let message = sample(1, 1);
        let now = Utc::now();
        let tombstone = Tombstone::of(&message, DestroyReason::ReadLimit, now);
        assert_eq!(tombstone.message_id, 1);
        assert_eq!(tombstone.subject, "hi");
        assert_eq!(tombstone.destroyed_at, now);

        let entry = SentEntry::Destroyed(tombstone);
        assert_eq!(entry.id(), 1);
        assert_eq!(entry.subject(), "hi");
    }

    #[test]
    fn test_destroy_reason_round_trip() {
        for reason in [DestroyReason::ReadLimit, DestroyReason::Expired] {
            assert_eq!(reason.as_str().parse::<DestroyReason>().unwrap(), reason);
        }
    }
}
