//! Request DTOs.

use serde::Deserialize;
use validator::Validate;

/// Registration request.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 320, message = "Email is required"))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    pub password: String,
}

/// Login request. Bad credentials are a 401, never a validation error.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Role change request.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    /// One of `user`, `moderator`, `admin`.
    #[validate(length(min = 1, message = "Role is required"))]
    pub role: String,
}

/// Send message request.
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 254, message = "Receiver email is required"))]
    pub receiver_email: String,
    pub subject: String,
    pub body: String,
    /// Reads before the message self-destructs; 0 or absent means unlimited.
    #[serde(default)]
    #[validate(range(min = 0, message = "read_limit must not be negative"))]
    pub read_limit: i64,
}

/// Label change request.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLabelRequest {
    #[validate(length(min = 1, message = "Label is required"))]
    pub label: String,
}
