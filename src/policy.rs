//! Access control policy.
//!
//! Pure decision functions consulted by every mutating operation before it
//! touches the store. Nothing here performs I/O.

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{Container, ResourceRecord, Role},
};

/// ResourceAction
///
/// Actions an actor may attempt on a single resource record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAction {
    Edit,
    Delete,
    Approve,
    Reject,
    Report,
}

impl ResourceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceAction::Edit => "edit",
            ResourceAction::Delete => "delete",
            ResourceAction::Approve => "approve",
            ResourceAction::Reject => "reject",
            ResourceAction::Report => "report",
        }
    }
}

/// can_mutate
///
/// - `Edit`/`Delete`: only the uploader, and only once they hold a
///   contributor or admin role. A viewer cannot touch their own submission.
/// - `Approve`/`Reject`: any contributor or admin, ownership ignored.
/// - `Report`: any authenticated actor, the uploader included.
pub fn can_mutate(actor: &AuthUser, record: &ResourceRecord, action: ResourceAction) -> bool {
    match action {
        ResourceAction::Edit | ResourceAction::Delete => {
            actor.uid == record.uploaded_by.uid && actor.role.is_reviewer()
        }
        ResourceAction::Approve | ResourceAction::Reject => actor.role.is_reviewer(),
        ResourceAction::Report => true,
    }
}

/// Approved records are visible to everyone signed in; pending ones only to
/// their uploader and to reviewers.
pub fn can_view(actor: &AuthUser, record: &ResourceRecord, container: Container) -> bool {
    match container {
        Container::Approved => true,
        Container::Pending => actor.role.is_reviewer() || actor.uid == record.uploaded_by.uid,
    }
}

pub fn can_review(actor: &AuthUser) -> bool {
    actor.role.is_reviewer()
}

pub fn can_change_role(actor: &AuthUser) -> bool {
    actor.role == Role::Admin
}

pub fn can_resolve_report(actor: &AuthUser) -> bool {
    actor.role == Role::Admin
}

/// Turns a policy decision into a `Forbidden` error.
pub fn ensure(allowed: bool, action: &str) -> AppResult<()> {
    if allowed {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("not permitted to {action}")))
    }
}

/// Shorthand for `ensure(can_mutate(..))`.
pub fn authorize(actor: &AuthUser, record: &ResourceRecord, action: ResourceAction) -> AppResult<()> {
    let allowed = can_mutate(actor, record, action);
    if !allowed {
        tracing::warn!(
            uid = %actor.uid,
            role = %actor.role,
            resource_id = %record.id,
            action = action.as_str(),
            "access denied"
        );
    }
    ensure(allowed, action.as_str())
}
