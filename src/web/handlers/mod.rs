//! HTTP handlers.

pub mod auth;
pub mod message;
pub mod user;

pub use auth::*;
pub use message::*;
pub use user::*;

use std::sync::Arc;

use tokio::sync::Notify;

use crate::auth::TokenService;
use crate::message::MessageService;
use crate::Database;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub tokens: Arc<TokenService>,
    /// Lifetime given to messages with a read limit.
    pub message_ttl: chrono::Duration,
    /// Wakes the notification dispatcher after a send, if one is running.
    pub dispatch_wake: Option<Arc<Notify>>,
}

impl AppState {
    pub fn new(db: Database, tokens: Arc<TokenService>, message_ttl: chrono::Duration) -> Self {
        Self {
            db,
            tokens,
            message_ttl,
            dispatch_wake: None,
        }
    }

    /// Signal `wake` whenever a message is sent.
    pub fn with_dispatch_wake(mut self, wake: Arc<Notify>) -> Self {
        self.dispatch_wake = Some(wake);
        self
    }

    /// Message service configured with this state's TTL.
    pub fn messages(&self) -> MessageService<'_> {
        MessageService::new(&self.db).with_ttl(self.message_ttl)
    }
}
