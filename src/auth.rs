use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AppConfig, Env},
    error::{AppError, AppResult, AuthError},
    identity::IdentityProvider,
    models::{Identity, Role, SignInProfile, UserRef},
    repository::{Repository, RepositoryState},
};

/// Claims
///
/// Payload of the session JWT (HS256, signed with `AppConfig::jwt_secret`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the provider uid, also the key of the `users` row.
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Custom role claim. Missing means `viewer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Issued At (iat): compared against `role_updated_at` to detect stale claims.
    pub iat: usize,
    /// Expiration Time (exp): tokens past this instant are refused.
    pub exp: usize,
}

/// Signs a session token. Used by the local tooling and the test suite.
pub fn encode_token(claims: &Claims, secret: &str) -> AppResult<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Downstream(format!("token signing failed: {e}")))
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AuthError::NoSession)
}

fn decode_claims(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("token rejected: {:?}", e.kind());
        AuthError::InvalidToken
    })
}

/// True iff `email` ends with `@<domain>`, ignoring case.
pub fn is_allowed_email(email: &str, domain: &str) -> bool {
    let suffix = format!("@{}", domain.trim_start_matches('@').to_lowercase());
    email.trim().to_lowercase().ends_with(&suffix)
}

/// True when a token issued at `issued_at` cannot be shown to postdate
/// `changed_at`.
///
/// `iat` has whole-second resolution, so a token from the same second as the
/// change counts as older.
pub fn is_stale(issued_at: usize, changed_at: Option<DateTime<Utc>>) -> bool {
    changed_at.is_some_and(|changed| changed.timestamp() >= issued_at as i64)
}

/// VerifiedToken
///
/// A signature- and expiry-checked token with no profile lookup. Only the
/// sign-in route uses it, since the profile may not exist yet.
#[derive(Debug, Clone)]
pub struct VerifiedToken(pub Claims);

impl<S> FromRequestParts<S> for VerifiedToken
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        let token = bearer_token(parts)?;
        Ok(VerifiedToken(decode_claims(token, &config.jwt_secret)?))
    }
}

/// AuthUser
///
/// The per-request session context. Every authenticated handler receives one;
/// there is no process-wide "current user".
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub name: String,
    pub email: String,
    /// Role from the token claim (or the cached profile role under the local bypass).
    pub role: Role,
    /// `None` under the local bypass.
    pub issued_at: Option<DateTime<Utc>>,
}

impl AuthUser {
    /// The actor as stored on resources and reports.
    pub fn as_user_ref(&self) -> UserRef {
        UserRef {
            uid: self.uid.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local`, `x-user-id` naming an existing profile
///    authenticates as that user with the profile's cached role.
/// 2. Bearer token: signature and expiry checked with `jsonwebtoken`.
/// 3. Domain: the token email must be institutional.
/// 4. Profile: must exist (created at sign-in), otherwise `NoSession`.
/// 5. Revocation: a token issued before `sessions_revoked_at` (sign-out) is
///    `NoSession`.
/// 6. Freshness: a token issued before `role_updated_at` is `StaleClaim`.
///
/// Rejects with an `AppError`, rendered as the JSON error body.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            if let Some(uid) = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
            {
                if let Some(profile) = repo.get_user(uid).await? {
                    tracing::debug!(uid = %profile.uid, "local x-user-id bypass");
                    return Ok(AuthUser {
                        uid: profile.uid,
                        name: profile.name,
                        email: profile.email,
                        role: profile.role,
                        issued_at: None,
                    });
                }
            }
        }
        // Production, or a bypass that named no profile: fall through to the JWT flow.

        let token = bearer_token(parts)?;
        let claims = decode_claims(token, &config.jwt_secret)?;

        if !is_allowed_email(&claims.email, &config.allowed_email_domain) {
            return Err(AuthError::DomainRejected(config.allowed_email_domain.clone()).into());
        }

        let profile = repo
            .get_user(&claims.sub)
            .await?
            .ok_or(AuthError::NoSession)?;

        if is_stale(claims.iat, profile.sessions_revoked_at) {
            tracing::info!(uid = %claims.sub, "refusing token minted before sign-out");
            return Err(AuthError::NoSession.into());
        }

        if is_stale(claims.iat, profile.role_updated_at) {
            tracing::info!(uid = %claims.sub, "refusing token minted before role change");
            return Err(AuthError::StaleClaim.into());
        }

        Ok(AuthUser {
            uid: claims.sub,
            name: claims.name.unwrap_or(profile.name),
            email: claims.email,
            role: claims.role.unwrap_or_default(),
            issued_at: Utc.timestamp_opt(claims.iat as i64, 0).single(),
        })
    }
}

/// authenticate
///
/// Sign-in. Enforces the institutional domain (revoking the provider session
/// on rejection), merges the profile and returns the identity with a freshly
/// resolved role claim.
pub async fn authenticate(
    repo: &dyn Repository,
    identity: &dyn IdentityProvider,
    allowed_domain: &str,
    claims: &Claims,
) -> AppResult<Identity> {
    if !is_allowed_email(&claims.email, allowed_domain) {
        if let Err(e) = identity.sign_out(&claims.sub).await {
            tracing::error!(uid = %claims.sub, "sign-out after domain rejection failed: {}", e);
        }
        tracing::warn!(email = %claims.email, "sign-in refused: outside @{}", allowed_domain);
        return Err(AuthError::DomainRejected(allowed_domain.to_string()).into());
    }

    let profile = repo
        .upsert_user_on_sign_in(SignInProfile {
            uid: claims.sub.clone(),
            name: claims.name.clone().unwrap_or_default(),
            email: claims.email.clone(),
            photo_url: claims.picture.clone().unwrap_or_default(),
        })
        .await?;

    let role = identity
        .role_claim(&claims.sub, true)
        .await?
        .unwrap_or_default();

    tracing::info!(uid = %profile.uid, role = %role, "signed in");

    Ok(Identity {
        uid: profile.uid,
        display_name: profile.name,
        email: profile.email,
        photo_url: profile.photo_url,
        role,
    })
}
