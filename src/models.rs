use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ValidationError;

// --- Enumerations ---

/// Role
///
/// The three trust tiers of the portal. Stored as lowercase text in both the
/// identity token claim and the cached profile copy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    /// Read-only tier; submissions go through moderation.
    #[default]
    Viewer,
    /// Can manage their own uploads and moderate the pending queue.
    Contributor,
    /// Full control, including role changes and report resolution.
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Viewer, Role::Contributor, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Contributor => "contributor",
            Role::Admin => "admin",
        }
    }

    /// Contributors and admins review pending submissions.
    pub fn is_reviewer(self) -> bool {
        matches!(self, Role::Contributor | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "viewer" => Ok(Role::Viewer),
            "contributor" => Ok(Role::Contributor),
            "admin" => Ok(Role::Admin),
            other => Err(ValidationError::InvalidRole(other.to_string())),
        }
    }
}

/// ResourceType
///
/// The kind of material a resource carries. `pdf` and `image` are file-backed,
/// `link` points at an external URL.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ResourceType {
    #[default]
    Pdf,
    Image,
    Link,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Pdf => "pdf",
            ResourceType::Image => "image",
            ResourceType::Link => "link",
        }
    }

    pub fn is_file(self) -> bool {
        !matches!(self, ResourceType::Link)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pdf" => Ok(ResourceType::Pdf),
            "image" => Ok(ResourceType::Image),
            "link" => Ok(ResourceType::Link),
            other => Err(ValidationError::Malformed(format!(
                "unknown resource type '{other}'"
            ))),
        }
    }
}

/// Container
///
/// The two logical partitions a resource record can live in. A record is in
/// exactly one of them at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Container {
    Pending,
    Approved,
}

impl Container {
    /// Backing table name in the document store.
    pub fn table(&self) -> &'static str {
        match self {
            Container::Pending => "pending_resources",
            Container::Approved => "resources",
        }
    }
}

// --- Core Application Schemas ---

/// UserRef
///
/// Denormalized identity snapshot embedded in resources (`uploadedBy`) and
/// reports (`reportedBy`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserRef {
    pub uid: String,
    pub name: String,
    pub email: String,
}

/// UserProfile
///
/// The identity-keyed record in the `users` partition. The `role` stored here
/// is a cached display copy; authorization decisions use the token claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    pub phone: String,
    pub batch: String,
    pub branch: String,
    pub bio: String,
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    /// Set whenever an admin changes the role. Tokens issued before this
    /// instant carry a stale claim.
    #[ts(type = "string | null")]
    pub role_updated_at: Option<DateTime<Utc>>,
    /// Set on sign-out. Tokens issued up to this instant are refused.
    #[ts(type = "string | null")]
    pub sessions_revoked_at: Option<DateTime<Utc>>,
}

/// SignInProfile
///
/// Fields the identity provider hands us on sign-in. Merged into the stored
/// profile; an empty `photo_url` never overwrites a stored photo.
#[derive(Debug, Clone, Default)]
pub struct SignInProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub photo_url: String,
}

/// ResourceRecord
///
/// One uploaded academic resource. `id` is stable across the pending to
/// approved transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ResourceRecord {
    pub id: Uuid,
    pub course_title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub course_code: String,
    pub year: String,
    pub semester: String,
    pub branch: String,
    pub professor: String,
    // Order is preserved exactly as uploaded.
    pub urls: Vec<String>,
    pub uploaded_by: UserRef,
    pub approved: bool,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

/// NewResource
///
/// A validated submission whose uploads have all completed. Only the store
/// assigns the id and timestamp.
#[derive(Debug, Clone, Default)]
pub struct NewResource {
    pub course_title: String,
    pub description: String,
    pub resource_type: ResourceType,
    pub course_code: String,
    pub year: String,
    pub semester: String,
    pub branch: String,
    pub professor: String,
    pub urls: Vec<String>,
    pub uploaded_by: UserRef,
}

/// Report
///
/// A flag raised against an approved resource. Reports carry their own id and
/// are indexed by `resource_id`, so several reports may target one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Report {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub course_code: String,
    pub reason: String,
    pub reported_by: UserRef,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

/// UploadFile
///
/// A file received from a multipart request, held in memory until it is
/// pushed to the media endpoint or the blob store.
#[derive(Debug, Clone, Default)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

// --- Request Payloads (Input Schemas) ---

/// SubmitResourceRequest
///
/// The `metadata` part of a submission (POST /resources). Files arrive as
/// separate `files` parts; `link` is only read for link-type resources.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[ts(export)]
pub struct SubmitResourceRequest {
    #[serde(default)]
    pub course_title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub semester: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub professor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// UpdateResourceRequest
///
/// Partial edit of an existing resource (PATCH /resources/{id}). Every field
/// is optional; anything not named here is rejected.
///
/// A `link` replaces the URL list of a link resource. Newly uploaded files are
/// appended after the existing URLs.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[ts(export)]
pub struct UpdateResourceRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semester: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub professor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// UpdateProfileRequest
///
/// Self-service profile edit (PUT /me). Role, email and uid are deliberately
/// absent, so attempts to send them fail deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// CreateReportRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateReportRequest {
    #[serde(default)]
    pub reason: String,
}

/// ResolutionAction
///
/// The three admin responses to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum ResolutionAction {
    DeleteResource,
    Warn,
    EditResource,
}

/// ResolveReportRequest
///
/// Input for POST /admin/reports/{id}/resolve. `email` overrides the warning
/// target (the resource uploader by default); `message` overrides the text.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ResolveReportRequest {
    pub action: ResolutionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// ReportResolution
///
/// Outcome of resolving a report. Only the fields relevant to the taken
/// action are populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReportResolution {
    pub action: ResolutionAction,
    pub resource_id: Uuid,
    /// Number of reports removed alongside a deleted resource.
    #[serde(default)]
    pub reports_removed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified: Option<String>,
    /// Where the client continues the standard edit flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_path: Option<String>,
}

/// SetRoleRequest
///
/// Body of POST /admin/set-role. Both fields are optional at the type level
/// so that a missing field maps to a 400 with a message instead of a
/// generic extractor rejection.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SetRoleRequest {
    pub uid: Option<String>,
    pub role: Option<String>,
}

/// SetRoleResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SetRoleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// --- Query Parameters ---

/// ResourceFilter
///
/// Query parameters for the repository listing (GET /resources). Every filter
/// is optional; `search` matches case-insensitively across the descriptive
/// fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ResourceFilter {
    /// Case-insensitive exact match on the course code.
    pub course_code: Option<String>,
    pub year: Option<String>,
    pub branch: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<ResourceType>,
    pub semester: Option<String>,
    pub search: Option<String>,
}

/// EmailQuery
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmailQuery {
    pub email: String,
}

// --- Dashboard & Session Schemas (Output) ---

/// Identity
///
/// What a successful sign-in returns. `role` comes from a freshly refreshed
/// claim, never from the cached profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Identity {
    pub uid: String,
    pub display_name: String,
    pub email: String,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    pub role: Role,
}

/// AdminDashboardStats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_users: i64,
    pub approved_resources: i64,
    pub pending_resources: i64,
    pub open_reports: i64,
}
