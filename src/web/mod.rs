//! HTTP API.
//!
//! JSON endpoints for registration, login, role administration and the
//! message lifecycle, behind bearer-token authentication.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::{create_app, create_router};
pub use server::WebServer;
