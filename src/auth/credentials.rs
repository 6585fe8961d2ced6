//! Credential store.
//!
//! Owns registration, login checks and role changes. Emails are trimmed and
//! lowercased before they are stored or looked up. Argon2 work runs on the
//! blocking pool so it never stalls the async workers.

use sqlx::SqlitePool;
use validator::ValidateEmail;

use super::guard;
use super::password::{self, PasswordError};
use super::token::AuthError;
use crate::db::{NewUser, Role, User, UserRepository};
use crate::{MailboxError, Result};

/// Maximum email length.
pub const MAX_EMAIL_LENGTH: usize = 254;

impl From<PasswordError> for MailboxError {
    fn from(e: PasswordError) -> Self {
        match e {
            PasswordError::TooShort | PasswordError::TooLong => {
                MailboxError::Validation(e.to_string())
            }
            other => MailboxError::Internal(other.to_string()),
        }
    }
}

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(MailboxError::Validation("email is required".to_string()));
    }
    if email.chars().count() > MAX_EMAIL_LENGTH || !email.validate_email() {
        return Err(MailboxError::Validation(format!(
            "invalid email address: {email}"
        )));
    }
    Ok(())
}

/// User records and password verification.
pub struct CredentialStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CredentialStore<'a> {
    /// Create a credential store over the given pool.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Find a user by email (normalized first).
    pub async fn find_by_email(&self, email: &str) -> Result<User> {
        UserRepository::new(self.pool)
            .get_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| MailboxError::NotFound("user".to_string()))
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: i64) -> Result<User> {
        UserRepository::new(self.pool)
            .get_by_id(id)
            .await?
            .ok_or_else(|| MailboxError::NotFound("user".to_string()))
    }

    /// Register a user with the default role.
    ///
    /// Fails with `Conflict` if the email is already registered, compared
    /// after trimming and case-insensitively.
    pub async fn create(&self, email: &str, raw_password: &str) -> Result<User> {
        self.create_with_role(email, raw_password, Role::User).await
    }

    /// Register a user with an explicit role.
    pub async fn create_with_role(
        &self,
        email: &str,
        raw_password: &str,
        role: Role,
    ) -> Result<User> {
        let email = normalize_email(email);
        validate_email(&email)?;
        password::validate_password(raw_password)?;

        let repo = UserRepository::new(self.pool);
        if repo.email_exists(&email).await? {
            return Err(MailboxError::Conflict("email already registered".to_string()));
        }

        let raw = raw_password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&raw))
            .await
            .map_err(|e| MailboxError::Internal(format!("hashing task failed: {e}")))??;

        // A concurrent registration can still win the race; the unique
        // index turns that into Conflict as well.
        let user = repo
            .create(&NewUser::new(email, password_hash).with_role(role))
            .await?;
        tracing::info!(user_id = user.id, role = %user.role, "User registered");
        Ok(user)
    }

    /// One-way password check.
    pub async fn verify_password(&self, user: &User, raw_password: &str) -> Result<bool> {
        let raw = raw_password.to_string();
        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || password::verify_password(&raw, &hash))
            .await
            .map_err(|e| MailboxError::Internal(format!("verification task failed: {e}")))??;
        Ok(matches)
    }

    /// Resolve and check a login.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, raw_password: &str) -> Result<User> {
        let user = match self.find_by_email(email).await {
            Ok(user) => user,
            Err(MailboxError::NotFound(_)) => return Err(AuthError::InvalidCredentials.into()),
            Err(e) => return Err(e),
        };

        if !self.verify_password(&user, raw_password).await? {
            tracing::info!(user_id = user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }
        Ok(user)
    }

    /// Change a user's role on behalf of `actor`.
    pub async fn update_role(&self, actor: Role, target_id: i64, new_role: Role) -> Result<User> {
        guard::require_role_modification(actor)?;

        let user = UserRepository::new(self.pool)
            .update_role(target_id, new_role)
            .await?
            .ok_or_else(|| MailboxError::NotFound("user".to_string()))?;
        tracing::info!(user_id = user.id, role = %new_role, "User role changed");
        Ok(user)
    }
}
