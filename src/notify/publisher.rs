//! Notification publishers.
//!
//! The dispatcher hands each due outbox entry to a [`NotificationPublisher`].
//! Two transports ship with the crate: an in-process broadcast bus and an
//! HTTP webhook.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::broadcast;
use tracing::debug;

use super::event::{NewMessageNotification, NEW_MESSAGE_ROUTING_KEY};
use crate::{MailboxError, Result};

/// Default capacity of the in-process bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Header carrying the topic on webhook deliveries.
pub const TOPIC_HEADER: &str = "X-Mailbox-Topic";

/// Header carrying the routing key on webhook deliveries.
pub const ROUTING_KEY_HEADER: &str = "X-Mailbox-Routing-Key";

const CONNECT_TIMEOUT_SECS: u64 = 5;
const USER_AGENT: &str = concat!("mailbox/", env!("CARGO_PKG_VERSION"));

/// Transport for new-message notifications.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Deliver one notification on `topic`.
    ///
    /// An `Err` means the delivery should be retried later.
    async fn publish(&self, topic: &str, notification: &NewMessageNotification) -> Result<()>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// A notification together with the topic it was published on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub routing_key: &'static str,
    pub notification: NewMessageNotification,
}

/// In-process bus built on `tokio::sync::broadcast`.
///
/// Publishing with no subscribers is not an error; the event is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<Published>,
}

impl BroadcastPublisher {
    /// Create a bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus holding up to `capacity` undelivered events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationPublisher for BroadcastPublisher {
    async fn publish(&self, topic: &str, notification: &NewMessageNotification) -> Result<()> {
        let event = Published {
            topic: topic.to_string(),
            routing_key: NEW_MESSAGE_ROUTING_KEY,
            notification: notification.clone(),
        };
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(message_id = notification.message_id, receivers, "Notification broadcast");
            }
            Err(_) => {
                debug!(
                    message_id = notification.message_id,
                    "Notification broadcast with no subscribers"
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "broadcast"
    }
}

/// Delivers notifications as JSON POSTs to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookPublisher {
    client: Client,
    url: String,
}

impl WebhookPublisher {
    /// Create a publisher posting to `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url)
            .map_err(|e| MailboxError::Config(format!("invalid webhook URL {url:?}: {e}")))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                MailboxError::Notification(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self { client, url })
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationPublisher for WebhookPublisher {
    async fn publish(&self, topic: &str, notification: &NewMessageNotification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header(TOPIC_HEADER, topic)
            .header(ROUTING_KEY_HEADER, NEW_MESSAGE_ROUTING_KEY)
            .json(notification)
            .send()
            .await
            .map_err(|e| MailboxError::Notification(format!("webhook request failed: {e}")))?;

        response
            .error_for_status()
            .map_err(|e| MailboxError::Notification(format!("webhook rejected: {e}")))?;

        debug!(message_id = notification.message_id, url = %self.url, "Notification posted");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
