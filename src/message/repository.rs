//! Message repository.
//!
//! Every function takes an executor so the lifecycle engine can run several
//! statements inside one transaction (`&mut *tx`) or a single statement on
//! the pool.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite};

use super::types::{DestroyReason, Label, Message, NewMessage, Tombstone};
use crate::db::from_millis;
use crate::{MailboxError, Result};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, subject, body, is_read, label, \
                               read_limit, read_count, expires_at, created_at";

const TOMBSTONE_COLUMNS: &str =
    "message_id, sender_id, receiver_id, subject, reason, created_at, destroyed_at";

/// Repository for message and tombstone rows.
pub struct MessageRepository;

impl MessageRepository {
    /// Insert a message in (Unread, inbox).
    pub(crate) async fn insert<'e, E>(executor: E, message: &NewMessage) -> Result<Message>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO messages
                 (sender_id, receiver_id, subject, body, read_limit, expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.subject)
        .bind(&message.body)
        .bind(message.read_limit)
        .bind(message.expires_at.map(|at| at.timestamp_millis()))
        .bind(message.created_at.timestamp_millis())
        .fetch_one(executor)
        .await?;

        row.into_message()
    }

    /// Get a message by ID.
    pub async fn get<'e, E>(executor: E, id: i64) -> Result<Option<Message>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        row.map(MessageRow::into_message).transpose()
    }

    /// Messages received by `receiver_id` under `label`, newest first.
    pub async fn list_by_receiver<'e, E>(
        executor: E,
        receiver_id: i64,
        label: Label,
    ) -> Result<Vec<Message>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE receiver_id = $1 AND label = $2
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(receiver_id)
        .bind(label.as_str())
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    /// Trashed messages where `user_id` is receiver or sender, newest first.
    pub async fn list_trash<'e, E>(executor: E, user_id: i64) -> Result<Vec<Message>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE label = 'trash' AND (receiver_id = $1 OR sender_id = $1)
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    /// Live messages sent by `sender_id` regardless of label, newest first.
    pub async fn list_by_sender<'e, E>(executor: E, sender_id: i64) -> Result<Vec<Message>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE sender_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(sender_id)
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    /// Delete the message if this receiver's first read is the last one
    /// allowed.
    ///
    /// Returns the row as it was before the read, or None when the message
    /// is absent, not addressed to `receiver_id`, already read, unlimited,
    /// or has reads left after this one.
    pub(crate) async fn delete_on_final_read<'e, E>(
        executor: E,
        id: i64,
        receiver_id: i64,
    ) -> Result<Option<Message>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "DELETE FROM messages
             WHERE id = $1 AND receiver_id = $2 AND is_read = 0
               AND read_limit > 0 AND read_count + 1 >= read_limit
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(id)
        .bind(receiver_id)
        .fetch_optional(executor)
        .await?;

        row.map(MessageRow::into_message).transpose()
    }

    /// Record the receiver's first read of a message that stays alive.
    ///
    /// Only the Unread to Read transition counts; re-reads change nothing.
    /// Returns whether a row changed.
    pub(crate) async fn record_read<'e, E>(executor: E, id: i64, receiver_id: i64) -> Result<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE messages
             SET is_read = 1,
                 read_count = read_count + CASE WHEN read_limit > 0 THEN 1 ELSE 0 END
             WHERE id = $1 AND receiver_id = $2 AND is_read = 0",
        )
        .bind(id)
        .bind(receiver_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set the label. Returns the updated message, or None if not found.
    pub(crate) async fn set_label<'e, E>(executor: E, id: i64, label: Label) -> Result<Option<Message>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "UPDATE messages SET label = $1 WHERE id = $2 RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(label.as_str())
        .bind(id)
        .fetch_optional(executor)
        .await?;

        row.map(MessageRow::into_message).transpose()
    }

    /// Record a destroyed message.
    pub(crate) async fn insert_tombstone<'e, E>(executor: E, tombstone: &Tombstone) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT OR IGNORE INTO message_tombstones
                 (message_id, sender_id, receiver_id, subject, reason, created_at, destroyed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(tombstone.message_id)
        .bind(tombstone.sender_id)
        .bind(tombstone.receiver_id)
        .bind(&tombstone.subject)
        .bind(tombstone.reason.as_str())
        .bind(tombstone.created_at.timestamp_millis())
        .bind(tombstone.destroyed_at.timestamp_millis())
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Get the tombstone of a destroyed message.
    pub async fn get_tombstone<'e, E>(executor: E, message_id: i64) -> Result<Option<Tombstone>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, TombstoneRow>(&format!(
            "SELECT {TOMBSTONE_COLUMNS} FROM message_tombstones WHERE message_id = $1"
        ))
        .bind(message_id)
        .fetch_optional(executor)
        .await?;

        row.map(TombstoneRow::into_tombstone).transpose()
    }

    /// Tombstones of messages sent by `sender_id`, newest first.
    pub async fn list_tombstones_by_sender<'e, E>(
        executor: E,
        sender_id: i64,
    ) -> Result<Vec<Tombstone>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, TombstoneRow>(&format!(
            "SELECT {TOMBSTONE_COLUMNS} FROM message_tombstones
             WHERE sender_id = $1
             ORDER BY created_at DESC, message_id DESC"
        ))
        .bind(sender_id)
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(TombstoneRow::into_tombstone).collect()
    }

    /// Write `expired` tombstones for every message whose horizon is before `now`.
    pub(crate) async fn tombstone_expired<'e, E>(executor: E, now: DateTime<Utc>) -> Result<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO message_tombstones
                 (message_id, sender_id, receiver_id, subject, reason, created_at, destroyed_at)
             SELECT id, sender_id, receiver_id, subject, 'expired', created_at, $1
             FROM messages
             WHERE expires_at IS NOT NULL AND expires_at < $1",
        )
        .bind(now.timestamp_millis())
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete every message whose horizon is before `now`.
    pub(crate) async fn delete_expired<'e, E>(executor: E, now: DateTime<Utc>) -> Result<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "DELETE FROM messages WHERE expires_at IS NOT NULL AND expires_at < $1",
        )
        .bind(now.timestamp_millis())
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Internal struct for mapping database rows to Message.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    sender_id: i64,
    receiver_id: i64,
    subject: String,
    body: String,
    is_read: bool,
    label: String,
    read_limit: i64,
    read_count: i64,
    expires_at: Option<i64>,
    created_at: i64,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        let label = self
            .label
            .parse::<Label>()
            .map_err(|e| MailboxError::Database(format!("message {}: {e}", self.id)))?;
        Ok(Message {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            subject: self.subject,
            body: self.body,
            is_read: self.is_read,
            label,
            read_limit: self.read_limit,
            read_count: self.read_count,
            expires_at: self.expires_at.map(from_millis).transpose()?,
            created_at: from_millis(self.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TombstoneRow {
    message_id: i64,
    sender_id: i64,
    receiver_id: i64,
    subject: String,
    reason: String,
    created_at: i64,
    destroyed_at: i64,
}

impl TombstoneRow {
    fn into_tombstone(self) -> Result<Tombstone> {
        Ok(Tombstone {
            message_id: self.message_id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            subject: self.subject,
            reason: self.reason.parse::<DestroyReason>()?,
            created_at: from_millis(self.created_at)?,
            destroyed_at: from_millis(self.destroyed_at)?,
        })
    }
}
