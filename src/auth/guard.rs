//! Access guard.
//!
//! Pure predicates run after token validation and before any lifecycle
//! operation. Failures are `MailboxError::Forbidden`.

use crate::db::Role;
use crate::{MailboxError, Result};

/// A resource with exactly two parties allowed to see it.
pub trait Participants {
    /// User who created the resource.
    fn sender_id(&self) -> i64;
    /// User the resource was addressed to.
    fn receiver_id(&self) -> i64;

    /// Whether `user_id` is the sender or the receiver.
    fn involves(&self, user_id: i64) -> bool {
        self.sender_id() == user_id || self.receiver_id() == user_id
    }
}

/// Authorize if `caller` is one of `allowed`.
pub fn require_role(caller: Role, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&caller) {
        Ok(())
    } else {
        Err(MailboxError::Forbidden(format!(
            "role {caller} is not permitted here"
        )))
    }
}

/// Authorize if the caller is the sender or receiver of `resource`.
pub fn require_ownership<R: Participants + ?Sized>(resource: &R, caller_id: i64) -> Result<()> {
    if resource.involves(caller_id) {
        Ok(())
    } else {
        Err(MailboxError::Forbidden(
            "not a participant of this message".to_string(),
        ))
    }
}

/// Whether `role` may change other users' roles.
pub fn can_modify_roles(role: Role) -> bool {
    role.can_modify_roles()
}

/// Fail unless `actor` may change roles.
pub fn require_role_modification(actor: Role) -> Result<()> {
    let allowed: Vec<Role> = Role::ALL
        .into_iter()
        .filter(|role| can_modify_roles(*role))
        .collect();
    require_role(actor, &allowed).map_err(|_| {
        MailboxError::Forbidden("only administrators can change roles".to_string())
    })
}
