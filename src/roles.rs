//! Role store administration.

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult, ValidationError},
    identity::IdentityProvider,
    models::{Role, SetRoleRequest, UserProfile},
    policy,
    repository::Repository,
};

/// change_role
///
/// Admin only. Writes the provider claim first and the cached profile role
/// second. Stamping `role_updated_at` makes every older token of the target
/// stale. An unknown uid is a bad request; a profile write that fails after
/// the claim changed is a `PartialFailure`.
pub async fn change_role(
    repo: &dyn Repository,
    identity: &dyn IdentityProvider,
    actor: &AuthUser,
    req: &SetRoleRequest,
) -> AppResult<UserProfile> {
    policy::ensure(policy::can_change_role(actor), "change roles")?;

    let uid = req
        .uid
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField("uid"))?;
    let role: Role = req
        .role
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ValidationError::MissingField("role"))?
        .parse()?;

    if repo.get_user(uid).await?.is_none() {
        return Err(ValidationError::Malformed(format!("no user with uid {uid}")).into());
    }

    identity.set_role_claim(uid, role).await?;
    let profile = match repo.set_user_role(uid, role).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return Err(claim_only(uid, role, "profile disappeared")),
        Err(e) => return Err(claim_only(uid, role, &e.to_string())),
    };

    tracing::info!(admin = %actor.uid, target = %uid, role = %role, "role changed");
    Ok(profile)
}

fn claim_only(uid: &str, role: Role, cause: &str) -> AppError {
    tracing::error!(target_uid = %uid, role = %role, "role claim set but profile not updated: {cause}");
    AppError::PartialFailure {
        message: format!("role claim for {uid} is now {role} but the profile write failed: {cause}"),
        orphaned: Vec::new(),
    }
}

/// Admin lookup through the email index.
pub async fn find_by_email(
    repo: &dyn Repository,
    actor: &AuthUser,
    email: &str,
) -> AppResult<UserProfile> {
    policy::ensure(policy::can_change_role(actor), "look up users")?;

    let uid = repo
        .find_uid_by_email(email)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user with email {}", email.trim())))?;
    repo.get_user(&uid)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {uid}")))
}
