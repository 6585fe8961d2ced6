//! New-message notifications.
//!
//! `send` writes an outbox entry in the same transaction as the message.
//! The dispatcher later publishes due entries through a
//! [`NotificationPublisher`], retrying with backoff, so a broker outage
//! never loses or blocks a send.

mod dispatcher;
mod event;
mod outbox;
mod publisher;

pub use dispatcher::{DispatchReport, DispatcherConfig, NotificationDispatcher};
pub use event::{NewMessageNotification, NEW_MESSAGE_ROUTING_KEY, NOTIFICATION_TOPIC};
pub use outbox::{
    retry_delay, OutboxEntry, OutboxRepository, INITIAL_RETRY_DELAY_SECS, MAX_RETRY_DELAY_SECS,
};
pub use publisher::{
    BroadcastPublisher, NotificationPublisher, Published, WebhookPublisher,
    DEFAULT_CHANNEL_CAPACITY, ROUTING_KEY_HEADER, TOPIC_HEADER,
};
