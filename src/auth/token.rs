//! Token issuing and validation.
//!
//! Tokens are HS256 JWTs carrying a snapshot of the user's id, email and
//! role. Validation re-reads the user on every call and rejects the token if
//! the stored role no longer matches the snapshot, so a role change takes
//! effect immediately for every outstanding token.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::{Role, User, UserRepository};
use crate::{MailboxError, Result};

/// Reasons a request fails authentication. All surface as 401.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No Authorization header.
    #[error("missing authorization")]
    MissingToken,
    /// Header present but not `Bearer <token>`.
    #[error("malformed authorization header")]
    MalformedHeader,
    /// `exp` is in the past.
    #[error("token expired")]
    Expired,
    /// Bad signature, wrong algorithm, not yet valid, or unparseable.
    #[error("invalid token")]
    InvalidToken,
    /// Claim role is not a member of the role enumeration.
    #[error("invalid role in token")]
    InvalidRole,
    /// Claim role differs from the user's current role.
    #[error("token role no longer matches user role")]
    RoleMismatch,
    /// Token subject no longer resolves to a user.
    #[error("user no longer exists")]
    UnknownUser,
    /// Login with a wrong email or password.
    #[error("invalid email or password")]
    InvalidCredentials,
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: i64,
    /// Email at issuance.
    pub email: String,
    /// Role at issuance. Kept as a string so that a forged or stale value
    /// can be told apart from a malformed token.
    pub role: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Not before (unix seconds).
    pub nbf: i64,
    /// Expiration (unix seconds).
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
}

/// A caller whose token passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// User ID.
    pub user_id: i64,
    /// Current email.
    pub email: String,
    /// Current role (equal to the claim role).
    pub role: Role,
}

/// Issues and validates tokens with a process-wide secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenService {
    /// Create a token service from a secret and token lifetime in seconds.
    pub fn new(secret: &str, lifetime_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "nbf"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            lifetime: Duration::seconds(lifetime_secs as i64),
        }
    }

    /// Token lifetime in seconds.
    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime.num_seconds()
    }

    /// Issue a token for a user, valid from now.
    pub fn issue(&self, user: &User) -> Result<String> {
        self.issue_at(user, Utc::now())
    }

    /// Issue a token as of `now`.
    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        self.encode(&claims)
    }

    /// Sign arbitrary claims.
    pub fn encode(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to encode JWT: {}", e);
            MailboxError::Internal("failed to sign token".to_string())
        })
    }

    /// Verify algorithm, signature, `exp` and `nbf`, returning the raw claims.
    pub fn decode(&self, token: &str) -> std::result::Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation failed: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::Expired,
                    _ => AuthError::InvalidToken,
                }
            })
    }

    /// Fully validate a token against the current user store.
    ///
    /// Checks, in order: signature and time window, claim role is a known
    /// role, the subject still exists, and the claim role equals the stored
    /// role.
    pub async fn validate(&self, pool: &SqlitePool, token: &str) -> Result<Identity> {
        let claims = self.decode(token)?;

        let claim_role: Role = claims.role.parse().map_err(|_| {
            tracing::warn!(user_id = claims.sub, "Token carries unknown role");
            AuthError::InvalidRole
        })?;

        let user = UserRepository::new(pool)
            .get_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        if user.role != claim_role {
            tracing::info!(
                user_id = user.id,
                token_role = %claim_role,
                current_role = %user.role,
                "Rejecting token issued for a previous role"
            );
            return Err(AuthError::RoleMismatch.into());
        }

        Ok(Identity {
            user_id: user.id,
            email: user.email,
            role: user.role,
        })
    }
}

/// Extract the token from an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> std::result::Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    match header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() && !token.contains(' ') => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}
