//! Authentication and authorization.
//!
//! Password hashing, the credential store, token issue/validation with live
//! role re-check, and the access guard predicates.

mod credentials;
pub mod guard;
mod password;
mod token;

pub use credentials::{normalize_email, CredentialStore, MAX_EMAIL_LENGTH};
pub use guard::{
    can_modify_roles, require_ownership, require_role, require_role_modification, Participants,
};
pub use password::{
    hash_password, validate_password, verify_password, PasswordError, MAX_PASSWORD_LENGTH,
    MIN_PASSWORD_LENGTH,
};
pub use token::{bearer_token, AuthError, Claims, Identity, TokenService};
