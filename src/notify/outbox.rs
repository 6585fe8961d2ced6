//! Notification outbox.
//!
//! Entries are written in the same transaction as the message they announce
//! and drained by the dispatcher. An entry is pending until it is delivered
//! or has used up its attempts.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Executor, Sqlite};

use super::event::{NewMessageNotification, NOTIFICATION_TOPIC};
use crate::db::from_millis;
use crate::{MailboxError, Result};

/// Delay before the first retry.
pub const INITIAL_RETRY_DELAY_SECS: i64 = 30;

/// Upper bound for the retry delay.
pub const MAX_RETRY_DELAY_SECS: i64 = 480;

const OUTBOX_COLUMNS: &str = "id, message_id, topic, payload, attempts, next_attempt_at, \
                              delivered_at, failed_at, last_error, created_at";

/// Delay before the next attempt after `attempts` failures.
///
/// 30s, 60s, 120s, 240s, then 480s for every later attempt.
pub fn retry_delay(attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(16);
    let secs = INITIAL_RETRY_DELAY_SECS.saturating_mul(1_i64 << exponent);
    Duration::seconds(secs.min(MAX_RETRY_DELAY_SECS))
}

/// A stored outbox entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub id: i64,
    pub message_id: i64,
    pub topic: String,
    pub notification: NewMessageNotification,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxEntry {
    /// Neither delivered nor given up on.
    pub fn is_pending(&self) -> bool {
        self.delivered_at.is_none() && self.failed_at.is_none()
    }
}

/// Repository for outbox rows.
pub struct OutboxRepository;

impl OutboxRepository {
    /// Queue a notification, due immediately.
    pub async fn enqueue<'e, E>(
        executor: E,
        notification: &NewMessageNotification,
        now: DateTime<Utc>,
    ) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let payload = serde_json::to_string(notification)
            .map_err(|e| MailboxError::Notification(format!("cannot encode payload: {e}")))?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO notification_outbox
                 (message_id, topic, payload, next_attempt_at, created_at)
             VALUES ($1, $2, $3, $4, $4)
             RETURNING id",
        )
        .bind(notification.message_id)
        .bind(NOTIFICATION_TOPIC)
        .bind(payload)
        .bind(now.timestamp_millis())
        .fetch_one(executor)
        .await?;
        Ok(id)
    }

    /// Pending entries due at `now`, oldest first.
    pub async fn due<'e, E>(executor: E, now: DateTime<Utc>, limit: i64) -> Result<Vec<OutboxEntry>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, OutboxRow>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM notification_outbox
             WHERE delivered_at IS NULL AND failed_at IS NULL AND next_attempt_at <= $1
             ORDER BY next_attempt_at, id
             LIMIT $2"
        ))
        .bind(now.timestamp_millis())
        .bind(limit)
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(OutboxRow::into_entry).collect()
    }

    /// Mark an entry delivered. Returns false if it already was.
    pub async fn mark_delivered<'e, E>(executor: E, id: i64, now: DateTime<Utc>) -> Result<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE notification_outbox
             SET delivered_at = $1, attempts = attempts + 1
             WHERE id = $2 AND delivered_at IS NULL",
        )
        .bind(now.timestamp_millis())
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a failed attempt.
    ///
    /// Schedules a retry with backoff, or marks the entry failed once it
    /// has used `max_attempts`. Returns the updated entry.
    pub async fn record_failure<'e, E>(
        executor: E,
        entry: &OutboxEntry,
        error: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<OutboxEntry>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let attempts = entry.attempts + 1;
        let failed_at = (attempts >= max_attempts).then_some(now.timestamp_millis());
        let next_attempt_at = now + retry_delay(attempts);

        let row = sqlx::query_as::<_, OutboxRow>(&format!(
            "UPDATE notification_outbox
             SET attempts = $1, next_attempt_at = $2, failed_at = $3, last_error = $4
             WHERE id = $5
             RETURNING {OUTBOX_COLUMNS}"
        ))
        .bind(i64::from(attempts))
        .bind(next_attempt_at.timestamp_millis())
        .bind(failed_at)
        .bind(error)
        .bind(entry.id)
        .fetch_one(executor)
        .await?;

        row.into_entry()
    }

    /// Get an entry by ID.
    pub async fn get<'e, E>(executor: E, id: i64) -> Result<Option<OutboxEntry>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, OutboxRow>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM notification_outbox WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        row.map(OutboxRow::into_entry).transpose()
    }

    /// All entries announcing `message_id`.
    pub async fn list_for_message<'e, E>(executor: E, message_id: i64) -> Result<Vec<OutboxEntry>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, OutboxRow>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM notification_outbox WHERE message_id = $1 ORDER BY id"
        ))
        .bind(message_id)
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(OutboxRow::into_entry).collect()
    }

    /// Number of entries still pending.
    pub async fn count_pending<'e, E>(executor: E) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_outbox
             WHERE delivered_at IS NULL AND failed_at IS NULL",
        )
        .fetch_one(executor)
        .await?;
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    message_id: i64,
    topic: String,
    payload: String,
    attempts: i64,
    next_attempt_at: i64,
    delivered_at: Option<i64>,
    failed_at: Option<i64>,
    last_error: Option<String>,
    created_at: i64,
}

impl OutboxRow {
    fn into_entry(self) -> Result<OutboxEntry> {
        let notification = serde_json::from_str(&self.payload).map_err(|e| {
            MailboxError::Database(format!("outbox entry {}: bad payload: {e}", self.id))
        })?;
        let attempts = u32::try_from(self.attempts).map_err(|_| {
            MailboxError::Database(format!("outbox entry {}: bad attempts", self.id))
        })?;
        Ok(OutboxEntry {
            id: self.id,
            message_id: self.message_id,
            topic: self.topic,
            notification,
            attempts,
            next_attempt_at: from_millis(self.next_attempt_at)?,
            delivered_at: self.delivered_at.map(from_millis).transpose()?,
            failed_at: self.failed_at.map(from_millis).transpose()?,
            last_error: self.last_error,
            created_at: from_millis(self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn notification(message_id: i64) -> NewMessageNotification {
        NewMessageNotification {
            message_id,
            sender_id: 1,
            receiver_id: 2,
            timestamp: from_millis(1_700_000_000_000).unwrap(),
        }
    }

    #[test]
    fn test_retry_delay_backoff() {
        let secs: Vec<i64> = (1..=7).map(|n| retry_delay(n).num_seconds()).collect();
        assert_eq!(secs, vec![30, 60, 120, 240, 480, 480, 480]);
        assert_eq!(retry_delay(0).num_seconds(), 30);
        assert_eq!(retry_delay(u32::MAX).num_seconds(), 480);
    }

    #[tokio::test]
    async fn test_enqueue_and_due() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();

        let id = OutboxRepository::enqueue(db.pool(), &notification(42), now)
            .await
            .unwrap();

        let due = OutboxRepository::due(db.pool(), now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);
        assert_eq!(due[0].topic, NOTIFICATION_TOPIC);
        assert_eq!(due[0].notification, notification(42));
        assert!(due[0].is_pending());

        let earlier = now - Duration::seconds(1);
        assert!(OutboxRepository::due(db.pool(), earlier, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_mark_delivered_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();
        let id = OutboxRepository::enqueue(db.pool(), &notification(1), now)
            .await
            .unwrap();

        assert!(OutboxRepository::mark_delivered(db.pool(), id, now).await.unwrap());
        assert!(!OutboxRepository::mark_delivered(db.pool(), id, now).await.unwrap());

        let entry = OutboxRepository::get(db.pool(), id).await.unwrap().unwrap();
        assert_eq!(entry.attempts, 1);
        assert!(!entry.is_pending());
        assert_eq!(OutboxRepository::count_pending(db.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_failure_schedules_then_fails() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();
        let id = OutboxRepository::enqueue(db.pool(), &notification(1), now)
            .await
            .unwrap();
        let mut entry = OutboxRepository::get(db.pool(), id).await.unwrap().unwrap();

        entry = OutboxRepository::record_failure(db.pool(), &entry, "boom", 2, now)
            .await
            .unwrap();
        assert_eq!(entry.attempts, 1);
        assert!(entry.is_pending());
        assert_eq!(entry.last_error.as_deref(), Some("boom"));
        assert_eq!(
            entry.next_attempt_at.timestamp_millis(),
            (now + Duration::seconds(30)).timestamp_millis()
        );

        entry = OutboxRepository::record_failure(db.pool(), &entry, "boom again", 2, now)
            .await
            .unwrap();
        assert_eq!(entry.attempts, 2);
        assert!(entry.failed_at.is_some());
        assert!(!entry.is_pending());

        let much_later = now + Duration::hours(1);
        assert!(OutboxRepository::due(db.pool(), much_later, 10)
            .await
            .unwrap()
            .is_empty());
    }
}
