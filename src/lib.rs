//! Mailbox - a small mail service with self-destructing messages.
//!
//! Users register and log in to obtain a bearer token, then send each other
//! messages. A message may carry a read limit: it is destroyed on the read
//! that exhausts the limit, or swept once its expiry passes. Every send
//! enqueues a notification in a transactional outbox that a background
//! dispatcher publishes.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod message;
pub mod notify;
pub mod web;

pub use auth::{CredentialStore, Identity, TokenService};
pub use config::Config;
pub use db::{Database, NewUser, Role, User, UserRepository};
pub use error::{MailboxError, Result};
pub use message::{Label, Message, MessageService, ReadOutcome, SendMessage};
pub use web::WebServer;
