//! Message lifecycle.
//!
//! Sending, the inbox/sent/spam/trash projections, reads with their
//! self-destruct side effect, labels and expiry.

mod maintenance;
mod repository;
mod service;
mod types;

pub use maintenance::MaintenanceTask;
pub use repository::MessageRepository;
pub use service::{MessageService, DEFAULT_MESSAGE_TTL_HOURS};
pub use types::{
    DeliveryState, DestroyReason, Label, Message, ReadOutcome, SendMessage, SentEntry, Tombstone,
    MAX_BODY_LENGTH, MAX_SUBJECT_LENGTH,
};
