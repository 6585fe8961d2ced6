//! Outbox dispatcher.
//!
//! Drains due outbox entries through a publisher. Each publish is bounded
//! by a timeout; failures are retried with backoff until the entry runs out
//! of attempts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::outbox::OutboxRepository;
use super::publisher::NotificationPublisher;
use crate::config::NotificationsConfig;
use crate::db::Database;
use crate::Result;

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound for one publish call.
    pub publish_timeout: Duration,
    /// Attempts before an entry is marked failed.
    pub max_attempts: u32,
    /// Entries loaded per pass.
    pub batch_size: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_secs(5),
            max_attempts: 5,
            batch_size: 100,
        }
    }
}

impl From<&NotificationsConfig> for DispatcherConfig {
    fn from(config: &NotificationsConfig) -> Self {
        Self {
            publish_timeout: config.publish_timeout(),
            max_attempts: config.max_attempts,
            batch_size: i64::from(config.batch_size),
        }
    }
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Entries published and marked delivered.
    pub delivered: usize,
    /// Entries that failed and were rescheduled.
    pub retried: usize,
    /// Entries that failed for the last time.
    pub failed: usize,
}

impl DispatchReport {
    /// Entries handled in this pass.
    pub fn total(&self) -> usize {
        self.delivered + self.retried + self.failed
    }
}

/// Publishes outbox entries.
#[derive(Clone)]
pub struct NotificationDispatcher {
    db: Database,
    publisher: Arc<dyn NotificationPublisher>,
    config: DispatcherConfig,
    wake: Arc<Notify>,
}

impl NotificationDispatcher {
    /// Create a dispatcher over `db` using `publisher`.
    pub fn new(
        db: Database,
        publisher: Arc<dyn NotificationPublisher>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            db,
            publisher,
            config,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Handle that makes a running dispatcher loop start a pass right away.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Publish every entry due at `now`.
    pub async fn dispatch_pending(&self, now: DateTime<Utc>) -> Result<DispatchReport> {
        let due = OutboxRepository::due(self.db.pool(), now, self.config.batch_size).await?;
        let mut report = DispatchReport::default();

        for entry in due {
            let published = tokio::time::timeout(
                self.config.publish_timeout,
                self.publisher.publish(&entry.topic, &entry.notification),
            )
            .await;

            let error = match published {
                Ok(Ok(())) => {
                    OutboxRepository::mark_delivered(self.db.pool(), entry.id, Utc::now()).await?;
                    debug!(
                        outbox_id = entry.id,
                        message_id = entry.message_id,
                        publisher = self.publisher.name(),
                        "Notification delivered"
                    );
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!(
                    "publish timed out after {}ms",
                    self.config.publish_timeout.as_millis()
                ),
            };

            let updated = OutboxRepository::record_failure(
                self.db.pool(),
                &entry,
                &error,
                self.config.max_attempts,
                Utc::now(),
            )
            .await?;

            if updated.is_pending() {
                warn!(
                    outbox_id = entry.id,
                    message_id = entry.message_id,
                    attempts = updated.attempts,
                    error = %error,
                    "Notification delivery failed, will retry"
                );
                report.retried += 1;
            } else {
                error!(
                    outbox_id = entry.id,
                    message_id = entry.message_id,
                    attempts = updated.attempts,
                    error = %error,
                    "Notification delivery failed permanently"
                );
                report.failed += 1;
            }
        }

        Ok(report)
    }

    /// Run passes every `period`, or sooner when woken.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            info!(
                publisher = self.publisher.name(),
                interval_ms = period.as_millis() as u64,
                "Notification dispatcher started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.wake.notified() => {}
                }

                match self.dispatch_pending(Utc::now()).await {
                    Ok(report) if report.total() > 0 => {
                        info!(
                            delivered = report.delivered,
                            retried = report.retried,
                            failed = report.failed,
                            "Notification dispatch pass"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Notification dispatch failed: {}", e);
                    }
                }
            }
        })
    }
}
