//! Periodic expiry sweep.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use super::service::MessageService;
use crate::db::Database;

/// Runs [`MessageService::sweep_expired`] on a fixed interval.
pub struct MaintenanceTask {
    db: Database,
    interval: Duration,
}

impl MaintenanceTask {
    pub fn new(db: Database, interval: Duration) -> Self {
        Self { db, interval }
    }

    /// One sweep. Errors are logged, never propagated.
    pub async fn run_once(&self) -> u64 {
        match MessageService::new(&self.db).sweep_expired(Utc::now()).await {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::info!(deleted_count = deleted, "Cleaned up expired messages");
                } else {
                    tracing::debug!("No expired messages to clean up");
                }
                deleted
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to clean up expired messages");
                0
            }
        }
    }

    /// Start sweeping in the background. The first sweep runs after one
    /// full interval.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.tick().await;

            loop {
                interval.tick().await;
                self.run_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRepository};
    use crate::message::SendMessage;

    #[tokio::test]
    async fn test_run_once_sweeps_expired() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        let alice = repo.create(&NewUser::new("a@x.com", "hash")).await.unwrap();
        repo.create(&NewUser::new("b@x.com", "hash")).await.unwrap();

        // A negative TTL puts the expiry in the past.
        MessageService::new(&db)
            .with_ttl(chrono::Duration::seconds(-1))
            .send(SendMessage::new(alice.id, "b@x.com", "s", "b").with_read_limit(1))
            .await
            .unwrap();

        let task = MaintenanceTask::new(db, Duration::from_secs(300));
        assert_eq!(task.run_once().await, 1);
        assert_eq!(task.run_once().await, 0);
    }
}
