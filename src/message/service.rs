//! Message lifecycle engine.
//!
//! Owns the business rules around sending, listing, reading, labeling and
//! expiring messages. Multi-statement operations run in one transaction;
//! nothing here touches the pool while a transaction is open.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::repository::MessageRepository;
use super::types::{
    DestroyReason, Label, Message, NewMessage, ReadOutcome, SendMessage, SentEntry, Tombstone,
    MAX_BODY_LENGTH, MAX_SUBJECT_LENGTH,
};
use crate::auth::{guard, CredentialStore, Participants};
use crate::db::Database;
use crate::notify::{NewMessageNotification, OutboxRepository};
use crate::{MailboxError, Result};

/// Default lifetime of self-destructing messages.
pub const DEFAULT_MESSAGE_TTL_HOURS: i64 = 24;

/// Service for message lifecycle operations.
pub struct MessageService<'a> {
    db: &'a Database,
    ttl: Duration,
}

impl<'a> MessageService<'a> {
    /// Create a service with the default message lifetime.
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            ttl: Duration::hours(DEFAULT_MESSAGE_TTL_HOURS),
        }
    }

    /// Override the lifetime applied to messages with a read limit.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Send a message.
    ///
    /// The message row and its notification outbox entry commit together.
    pub async fn send(&self, request: SendMessage) -> Result<Message> {
        if request.read_limit < 0 {
            return Err(MailboxError::Validation(
                "read_limit must not be negative".to_string(),
            ));
        }
        let subject = validate_text("subject", &request.subject, MAX_SUBJECT_LENGTH)?;
        let body = validate_text("body", &request.body, MAX_BODY_LENGTH)?;

        let receiver = match CredentialStore::new(self.db.pool())
            .find_by_email(&request.receiver_email)
            .await
        {
            Ok(user) => user,
            Err(MailboxError::NotFound(_)) => {
                return Err(MailboxError::NotFound("receiver".to_string()))
            }
            Err(e) => return Err(e),
        };

        let now = Utc::now();
        let new_message = NewMessage {
            sender_id: request.sender_id,
            receiver_id: receiver.id,
            subject,
            body,
            read_limit: request.read_limit,
            expires_at: (request.read_limit > 0).then(|| now + self.ttl),
            created_at: now,
        };

        let mut tx = self.db.begin().await?;
        let message = MessageRepository::insert(&mut *tx, &new_message).await?;
        let notification = NewMessageNotification::for_message(&message);
        OutboxRepository::enqueue(&mut *tx, &notification, now).await?;
        tx.commit().await?;

        info!(
            message_id = message.id,
            sender_id = message.sender_id,
            receiver_id = message.receiver_id,
            read_limit = message.read_limit,
            "Message sent"
        );
        Ok(message)
    }

    /// Messages in the receiver's inbox.
    pub async fn list_inbox(&self, user_id: i64) -> Result<Vec<Message>> {
        MessageRepository::list_by_receiver(self.db.pool(), user_id, Label::Inbox).await
    }

    /// Messages the receiver marked as spam.
    pub async fn list_spam(&self, user_id: i64) -> Result<Vec<Message>> {
        MessageRepository::list_by_receiver(self.db.pool(), user_id, Label::Spam).await
    }

    /// Trashed messages the user sent or received.
    pub async fn list_trash(&self, user_id: i64) -> Result<Vec<Message>> {
        MessageRepository::list_trash(self.db.pool(), user_id).await
    }

    /// Everything the user sent, including the subjects of destroyed messages.
    pub async fn list_sent(&self, user_id: i64) -> Result<Vec<SentEntry>> {
        let mut conn = self.db.pool().acquire().await?;
        let live = MessageRepository::list_by_sender(&mut *conn, user_id).await?;
        let destroyed = MessageRepository::list_tombstones_by_sender(&mut *conn, user_id).await?;

        let mut entries: Vec<SentEntry> = live
            .into_iter()
            .map(SentEntry::Live)
            .chain(destroyed.into_iter().map(SentEntry::Destroyed))
            .collect();
        entries.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(entries)
    }

    /// Open a message, applying the receiver's read.
    ///
    /// The receiver's first read marks the message read and, with a read
    /// limit, counts; the read that reaches the limit deletes the row and
    /// returns its final snapshot. The sender, or a receiver re-opening a
    /// message that is already read, changes nothing.
    pub async fn get_with_read_side_effect(
        &self,
        message_id: i64,
        caller_id: i64,
    ) -> Result<ReadOutcome> {
        let mut tx = self.db.begin().await?;

        // The guarded write goes first so concurrent readers serialize on
        // the row instead of acting on a stale count.
        if let Some(mut message) =
            MessageRepository::delete_on_final_read(&mut *tx, message_id, caller_id).await?
        {
            message.is_read = true;
            message.read_count += 1;
            let tombstone = Tombstone::of(&message, DestroyReason::ReadLimit, Utc::now());
            MessageRepository::insert_tombstone(&mut *tx, &tombstone).await?;
            tx.commit().await?;

            info!(
                message_id,
                receiver_id = caller_id,
                read_limit = message.read_limit,
                "Message destroyed after final read"
            );
            return Ok(ReadOutcome::Destroyed(message));
        }

        let recorded = MessageRepository::record_read(&mut *tx, message_id, caller_id).await?;

        let Some(message) = MessageRepository::get(&mut *tx, message_id).await? else {
            let tombstone = MessageRepository::get_tombstone(&mut *tx, message_id).await?;
            return Err(match tombstone {
                Some(t) if t.involves(caller_id) => MailboxError::Destroyed(message_id),
                _ => MailboxError::NotFound("message".to_string()),
            });
        };
        guard::require_ownership(&message, caller_id)?;
        tx.commit().await?;

        if recorded {
            debug!(message_id, read_count = message.read_count, "Message read");
            Ok(ReadOutcome::Read(message))
        } else {
            Ok(ReadOutcome::Viewed(message))
        }
    }

    /// Relabel a message on behalf of its sender or receiver.
    pub async fn update_label(&self, message_id: i64, caller_id: i64, label: &str) -> Result<Message> {
        let label = label.parse::<Label>()?;

        let mut tx = self.db.begin().await?;
        let message = MessageRepository::get(&mut *tx, message_id)
            .await?
            .ok_or_else(|| MailboxError::NotFound("message".to_string()))?;
        guard::require_ownership(&message, caller_id)?;

        let updated = MessageRepository::set_label(&mut *tx, message_id, label)
            .await?
            .ok_or_else(|| MailboxError::NotFound("message".to_string()))?;
        tx.commit().await?;

        debug!(message_id, label = %label, "Message label changed");
        Ok(updated)
    }

    /// Delete every message whose expiry is before `now`, whatever its state.
    ///
    /// Returns how many rows were deleted; a second run with the same `now`
    /// returns 0.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.db.begin().await?;
        MessageRepository::tombstone_expired(&mut *tx, now).await?;
        let deleted = MessageRepository::delete_expired(&mut *tx, now).await?;
        tx.commit().await?;

        if deleted > 0 {
            info!(deleted, "Expired messages swept");
        }
        Ok(deleted)
    }
}

/// Trim and bound a text field; returns the trimmed value.
fn validate_text(field: &str, value: &str, max_chars: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MailboxError::Validation(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max_chars {
        return Err(MailboxError::Validation(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, User, UserRepository};

    async fn setup() -> (Database, User, User) {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        let alice = repo
            .create(&NewUser::new("alice@x.com", "hash"))
            .await
            .unwrap();
        let bob = repo.create(&NewUser::new("bob@x.com", "hash")).await.unwrap();
        (db, alice, bob)
    }

    #[tokio::test]
    async fn test_send_sets_defaults_and_outbox() {
        let (db, alice, bob) = setup().await;
        let service = MessageService::new(&db);

        let message = service
            .send(SendMessage::new(alice.id, " BOB@x.com ", "  Hello ", "World"))
            .await
            .unwrap();

        assert_eq!(message.receiver_id, bob.id);
        assert_eq!(message.subject, "Hello");
        assert!(!message.is_read);
        assert_eq!(message.label, Label::Inbox);
        assert!(message.expires_at.is_none());

        let entries = OutboxRepository::list_for_message(db.pool(), message.id)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_send_with_read_limit_sets_expiry() {
        let (db, alice, _bob) = setup().await;
        let service = MessageService::new(&db).with_ttl(Duration::hours(2));

        let message = service
            .send(SendMessage::new(alice.id, "bob@x.com", "s", "b").with_read_limit(3))
            .await
            .unwrap();

        let expires_at = message.expires_at.unwrap();
        assert_eq!(expires_at - message.created_at, Duration::hours(2));
    }

    #[tokio::test]
    async fn test_send_rejects_bad_input() {
        let (db, alice, _bob) = setup().await;
        let service = MessageService::new(&db);

        let cases = [
            SendMessage::new(alice.id, "bob@x.com", "s", "b").with_read_limit(-1),
            SendMessage::new(alice.id, "bob@x.com", "   ", "b"),
            SendMessage::new(alice.id, "bob@x.com", "s", ""),
            SendMessage::new(alice.id, "bob@x.com", "x".repeat(101), "b"),
            SendMessage::new(alice.id, "bob@x.com", "s", "x".repeat(10_001)),
        ];
        for request in cases {
            assert!(matches!(
                service.send(request).await,
                Err(MailboxError::Validation(_))
            ));
        }

        assert!(matches!(
            service
                .send(SendMessage::new(alice.id, "ghost@x.com", "s", "b"))
                .await,
            Err(MailboxError::NotFound(_))
        ));
        assert_eq!(OutboxRepository::count_pending(db.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unlimited_read_marks_once() {
        let (db, alice, bob) = setup().await;
        let service = MessageService::new(&db);
        let message = service
            .send(SendMessage::new(alice.id, "bob@x.com", "s", "b"))
            .await
            .unwrap();

        let sender_view = service
            .get_with_read_side_effect(message.id, alice.id)
            .await
            .unwrap();
        assert!(matches!(sender_view, ReadOutcome::Viewed(ref m) if !m.is_read));

        let first = service
            .get_with_read_side_effect(message.id, bob.id)
            .await
            .unwrap();
        assert!(matches!(first, ReadOutcome::Read(ref m) if m.is_read && m.read_count == 0));

        let second = service
            .get_with_read_side_effect(message.id, bob.id)
            .await
            .unwrap();
        assert!(matches!(second, ReadOutcome::Viewed(_)));
    }

    #[tokio::test]
    async fn test_single_read_message_is_destroyed() {
        let (db, alice, bob) = setup().await;
        let service = MessageService::new(&db);
        let message = service
            .send(SendMessage::new(alice.id, "bob@x.com", "secret", "b").with_read_limit(1))
            .await
            .unwrap();

        match service
            .get_with_read_side_effect(message.id, bob.id)
            .await
            .unwrap()
        {
            ReadOutcome::Destroyed(m) => {
                assert!(m.is_read);
                assert_eq!(m.read_count, 1);
            }
            other => panic!("expected destroyed, got {other:?}"),
        }

        for caller in [alice.id, bob.id] {
            assert!(matches!(
                service.get_with_read_side_effect(message.id, caller).await,
                Err(MailboxError::Destroyed(id)) if id == message.id
            ));
        }

        let sent = service.list_sent(alice.id).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], SentEntry::Destroyed(t) if t.subject == "secret"));
    }

    #[tokio::test]
    async fn test_rereading_read_message_changes_nothing() {
        let (db, alice, bob) = setup().await;
        let service = MessageService::new(&db);
        let message = service
            .send(SendMessage::new(alice.id, "bob@x.com", "twice", "b").with_read_limit(2))
            .await
            .unwrap();

        let first = service
            .get_with_read_side_effect(message.id, bob.id)
            .await
            .unwrap();
        assert!(matches!(first, ReadOutcome::Read(ref m) if m.is_read && m.read_count == 1));

        for _ in 0..3 {
            let again = service
                .get_with_read_side_effect(message.id, bob.id)
                .await
                .unwrap();
            assert!(matches!(again, ReadOutcome::Viewed(ref m) if m.read_count == 1));
        }

        let stored = MessageRepository::get(db.pool(), message.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_read);
        assert_eq!(stored.read_count, 1);
        assert!(MessageRepository::get_tombstone(db.pool(), message.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_label_survives_read() {
        let (db, alice, bob) = setup().await;
        let service = MessageService::new(&db);

        for read_limit in [0, 2] {
            let message = service
                .send(SendMessage::new(alice.id, "bob@x.com", "s", "b").with_read_limit(read_limit))
                .await
                .unwrap();
            service.update_label(message.id, bob.id, "spam").await.unwrap();

            let outcome = service
                .get_with_read_side_effect(message.id, bob.id)
                .await
                .unwrap();
            assert!(!outcome.is_destroyed());
            assert_eq!(outcome.message().label, Label::Spam);
            assert!(outcome.message().is_read);
        }
    }

    #[tokio::test]
    async fn test_sender_reads_do_not_count() {
        let (db, alice, bob) = setup().await;
        let service = MessageService::new(&db);
        let message = service
            .send(SendMessage::new(alice.id, "bob@x.com", "s", "b").with_read_limit(1))
            .await
            .unwrap();

        for _ in 0..3 {
            let outcome = service
                .get_with_read_side_effect(message.id, alice.id)
                .await
                .unwrap();
            assert!(matches!(outcome, ReadOutcome::Viewed(ref m) if m.read_count == 0));
        }
        assert!(service
            .get_with_read_side_effect(message.id, bob.id)
            .await
            .unwrap()
            .is_destroyed());
    }

    #[tokio::test]
    async fn test_outsider_is_forbidden_without_mutation() {
        let (db, alice, _bob) = setup().await;
        let eve = UserRepository::new(db.pool())
            .create(&NewUser::new("eve@x.com", "hash"))
            .await
            .unwrap();
        let service = MessageService::new(&db);
        let message = service
            .send(SendMessage::new(alice.id, "bob@x.com", "s", "b").with_read_limit(1))
            .await
            .unwrap();

        assert!(matches!(
            service.get_with_read_side_effect(message.id, eve.id).await,
            Err(MailboxError::Forbidden(_))
        ));
        assert!(matches!(
            service.update_label(message.id, eve.id, "spam").await,
            Err(MailboxError::Forbidden(_))
        ));

        let stored = MessageRepository::get(db.pool(), message.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_read);
        assert_eq!(stored.label, Label::Inbox);
    }

    #[tokio::test]
    async fn test_unknown_message_not_found() {
        let (db, alice, _bob) = setup().await;
        let service = MessageService::new(&db);
        assert!(matches!(
            service.get_with_read_side_effect(999, alice.id).await,
            Err(MailboxError::NotFound(_))
        ));
        assert!(matches!(
            service.update_label(999, alice.id, "spam").await,
            Err(MailboxError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_labels_move_between_views() {
        let (db, alice, bob) = setup().await;
        let service = MessageService::new(&db);
        let message = service
            .send(SendMessage::new(alice.id, "bob@x.com", "s", "b"))
            .await
            .unwrap();

        assert!(matches!(
            service.update_label(message.id, bob.id, "archive").await,
            Err(MailboxError::Validation(_))
        ));

        service.update_label(message.id, bob.id, "spam").await.unwrap();
        assert!(service.list_inbox(bob.id).await.unwrap().is_empty());
        assert_eq!(service.list_spam(bob.id).await.unwrap().len(), 1);

        let trashed = service
            .update_label(message.id, alice.id, "trash")
            .await
            .unwrap();
        assert_eq!(trashed.label, Label::Trash);
        assert_eq!(service.list_trash(alice.id).await.unwrap().len(), 1);
        assert_eq!(service.list_trash(bob.id).await.unwrap().len(), 1);

        // Label changes leave read state alone.
        assert!(!trashed.is_read);
        // Sent view ignores labels.
        assert_eq!(service.list_sent(alice.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_expired_is_idempotent() {
        let (db, alice, bob) = setup().await;
        let service = MessageService::new(&db).with_ttl(Duration::minutes(5));
        let limited = service
            .send(SendMessage::new(alice.id, "bob@x.com", "s", "b").with_read_limit(5))
            .await
            .unwrap();
        let unlimited = service
            .send(SendMessage::new(alice.id, "bob@x.com", "s", "b"))
            .await
            .unwrap();

        // Reading does not protect a message from expiry.
        service
            .get_with_read_side_effect(limited.id, bob.id)
            .await
            .unwrap();

        assert_eq!(service.sweep_expired(Utc::now()).await.unwrap(), 0);

        let later = Utc::now() + Duration::minutes(10);
        assert_eq!(service.sweep_expired(later).await.unwrap(), 1);
        assert_eq!(service.sweep_expired(later).await.unwrap(), 0);

        assert!(matches!(
            service.get_with_read_side_effect(limited.id, bob.id).await,
            Err(MailboxError::Destroyed(_))
        ));
        assert!(service
            .get_with_read_side_effect(unlimited.id, bob.id)
            .await
            .is_ok());
    }

    #[test]
    fn test_validate_text_counts_chars() {
        assert_eq!(validate_text("subject", "  ok ", 100).unwrap(), "ok");
        assert!(validate_text("subject", &"é".repeat(100), 100).is_ok());
        assert!(validate_text("subject", &"é".repeat(101), 100).is_err());
    }
}
