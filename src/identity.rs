use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    error::{AppError, AppResult},
    models::Role,
};

/// IdentityProvider
///
/// Admin-side contract with the external authentication provider. The
/// provider owns sessions and the custom `role` claim; we only ask it to
/// revoke, read or rewrite them.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Revokes every session of `uid`. Tokens minted before this call stop
    /// refreshing.
    async fn sign_out(&self, uid: &str) -> AppResult<()>;

    /// Reads the role claim. `force_refresh` bypasses any cached value and
    /// asks the provider directly.
    async fn role_claim(&self, uid: &str, force_refresh: bool) -> AppResult<Option<Role>>;

    async fn set_role_claim(&self, uid: &str, role: Role) -> AppResult<()>;
}

pub type IdentityState = Arc<dyn IdentityProvider>;

/// IdentityToolkitProvider
///
/// Talks to the Identity Toolkit admin REST API
/// (`/v1/projects/{project}/accounts:*`) with a bearer service token.
pub struct IdentityToolkitProvider {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    api_token: String,
    claim_cache: Mutex<HashMap<String, Role>>,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    // JSON-encoded object, e.g. "{\"role\":\"admin\"}".
    custom_attributes: Option<String>,
}

#[derive(Deserialize)]
struct CustomAttributes {
    role: Option<Role>,
}

impl IdentityToolkitProvider {
    pub fn new(base_url: &str, project_id: &str, api_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            api_token: api_token.to_string(),
            claim_cache: Mutex::new(HashMap::new()),
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/v1/projects/{}/accounts:{}",
            self.base_url, self.project_id, action
        )
    }

    async fn post(&self, action: &str, body: serde_json::Value) -> AppResult<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint(action))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Downstream(format!("identity provider unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Downstream(format!(
                "identity provider accounts:{action} returned {status}: {detail}"
            )));
        }
        Ok(response)
    }

    fn cache_role(&self, uid: &str, role: Option<Role>) {
        if let Ok(mut cache) = self.claim_cache.lock() {
            match role {
                Some(role) => cache.insert(uid.to_string(), role),
                None => cache.remove(uid),
            };
        }
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitProvider {
    async fn sign_out(&self, uid: &str) -> AppResult<()> {
        self.post(
            "update",
            json!({
                "localId": uid,
                "validSince": Utc::now().timestamp().to_string(),
            }),
        )
        .await?;
        self.cache_role(uid, None);
        tracing::info!(uid = %uid, "provider sessions revoked");
        Ok(())
    }

    async fn role_claim(&self, uid: &str, force_refresh: bool) -> AppResult<Option<Role>> {
        if !force_refresh {
            if let Some(role) = self
                .claim_cache
                .lock()
                .ok()
                .and_then(|cache| cache.get(uid).copied())
            {
                return Ok(Some(role));
            }
        }

        let lookup = self
            .post("lookup", json!({ "localId": [uid] }))
            .await?
            .json::<LookupResponse>()
            .await
            .map_err(|e| AppError::Downstream(format!("bad accounts:lookup payload: {e}")))?;

        let role = lookup
            .users
            .into_iter()
            .next()
            .and_then(|user| user.custom_attributes)
            .and_then(|raw| serde_json::from_str::<CustomAttributes>(&raw).ok())
            .and_then(|attrs| attrs.role);

        self.cache_role(uid, role);
        Ok(role)
    }

    async fn set_role_claim(&self, uid: &str, role: Role) -> AppResult<()> {
        self.post(
            "update",
            json!({
                "localId": uid,
                "customAttributes": json!({ "role": role }).to_string(),
            }),
        )
        .await?;
        self.cache_role(uid, Some(role));
        tracing::info!(uid = %uid, role = %role, "role claim updated");
        Ok(())
    }
}

/// MockIdentityProvider
///
/// In-memory provider for tests and the local profile. Records every
/// sign-out so tests can assert on it.
#[derive(Default)]
pub struct MockIdentityProvider {
    claims: Mutex<HashMap<String, Role>>,
    signed_out: Mutex<Vec<String>>,
    /// When true, every call fails with a downstream error.
    pub should_fail: bool,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn with_claim(self, uid: &str, role: Role) -> Self {
        if let Ok(mut claims) = self.claims.lock() {
            claims.insert(uid.to_string(), role);
        }
        self
    }

    pub fn signed_out(&self) -> Vec<String> {
        self.signed_out
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    fn check(&self) -> AppResult<()> {
        if self.should_fail {
            return Err(AppError::Downstream(
                "Mock Identity Error: Simulation requested".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_out(&self, uid: &str) -> AppResult<()> {
        self.check()?;
        if let Ok(mut list) = self.signed_out.lock() {
            list.push(uid.to_string());
        }
        Ok(())
    }

    async fn role_claim(&self, uid: &str, _force_refresh: bool) -> AppResult<Option<Role>> {
        self.check()?;
        Ok(self
            .claims
            .lock()
            .ok()
            .and_then(|claims| claims.get(uid).copied()))
    }

    async fn set_role_claim(&self, uid: &str, role: Role) -> AppResult<()> {
        self.check()?;
        if let Ok(mut claims) = self.claims.lock() {
            claims.insert(uid.to_string(), role);
        }
        Ok(())
    }
}
