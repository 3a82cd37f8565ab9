use crate::{
    AppState,
    auth::{self, AuthUser, VerifiedToken},
    error::{AppError, AppResult, ValidationError},
    models::{
        AdminDashboardStats, CreateReportRequest, EmailQuery, Identity, Report, ReportResolution,
        ResolveReportRequest, ResourceFilter, ResourceRecord, SetRoleRequest, SetRoleResponse,
        SubmitResourceRequest, UpdateProfileRequest, UpdateResourceRequest, UploadFile,
        UserProfile,
    },
    moderation, policy, reports, roles,
};
use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

// --- Multipart Helpers ---

/// Body-limit overruns surface while streaming a part; everything else is a
/// malformed body.
fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        ValidationError::Malformed(e.body_text()).into()
    }
}

/// read_submission
///
/// Splits a `multipart/form-data` body into its `metadata` JSON part and its
/// `files` parts, in the order they were sent.
async fn read_submission<T: DeserializeOwned>(
    mut multipart: Multipart,
) -> AppResult<(Option<T>, Vec<UploadFile>)> {
    let mut metadata = None;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("metadata") => {
                let text = field
                    .text()
                    .await
                    .map_err(multipart_error)?;
                metadata = Some(
                    serde_json::from_str::<T>(&text)
                        .map_err(|e| ValidationError::Malformed(format!("metadata: {e}")))?,
                );
            }
            Some("files") => files.push(read_file(field).await?),
            Some(other) => {
                return Err(
                    ValidationError::Malformed(format!("unexpected part '{other}'")).into(),
                );
            }
            None => return Err(ValidationError::Malformed("unnamed part".to_string()).into()),
        }
    }

    Ok((metadata, files))
}

async fn read_file(field: Field<'_>) -> AppResult<UploadFile> {
    let file_name = field.file_name().unwrap_or("upload.bin").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(multipart_error)?;
    Ok(UploadFile {
        file_name,
        content_type,
        bytes: bytes.to_vec(),
    })
}

// --- Session ---

/// sign_in
///
/// [Public Route] Exchanges a provider token for a session. Refuses
/// (and signs out) any account outside the institutional domain, creates the
/// profile on first sign-in, and returns the identity with a freshly
/// resolved role claim.
#[utoipa::path(
    post,
    path = "/auth/session",
    responses(
        (status = 200, description = "Signed in", body = Identity),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Email outside the allowed domain")
    )
)]
pub async fn sign_in(
    VerifiedToken(claims): VerifiedToken,
    State(state): State<AppState>,
) -> AppResult<Json<Identity>> {
    let identity = auth::authenticate(
        state.repo.as_ref(),
        state.identity.as_ref(),
        &state.config.allowed_email_domain,
        &claims,
    )
    .await?;
    Ok(Json(identity))
}

/// sign_out
///
/// [Authenticated Route] Revokes the caller's provider sessions and stamps
/// the profile so every session token issued up to now is refused.
#[utoipa::path(
    delete,
    path = "/auth/session",
    responses((status = 204, description = "Signed out"))
)]
pub async fn sign_out(
    AuthUser { uid, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<StatusCode> {
    state.identity.sign_out(&uid).await?;
    state
        .repo
        .revoke_sessions(&uid)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {uid}")))?;
    tracing::info!(uid = %uid, "sessions revoked");
    Ok(StatusCode::NO_CONTENT)
}

// --- Profile ---

/// get_me
///
/// [Authenticated Route] The caller's stored profile. The `role` here is the
/// cached copy; the session's role comes from the token.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn get_me(
    AuthUser { uid, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<UserProfile>> {
    state
        .repo
        .get_user(&uid)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("user {uid}")))
}

/// update_me
///
/// [Authenticated Route] Self-service edit of name, phone, batch, branch and
/// bio. Any other field is rejected by the schema.
#[utoipa::path(
    put,
    path = "/me",
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "Updated", body = UserProfile))
)]
pub async fn update_me(
    AuthUser { uid, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserProfile>> {
    state
        .repo
        .update_profile(&uid, payload)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("user {uid}")))
}

/// upload_photo
///
/// [Authenticated Route] Stores a new profile photo (a single `photo` image
/// part) in the blob store and points the profile at it.
#[utoipa::path(
    post,
    path = "/me/photo",
    responses(
        (status = 200, description = "Photo replaced", body = UserProfile),
        (status = 400, description = "Missing or non-image part"),
        (status = 413, description = "Body over the upload limit"),
        (status = 502, description = "Blob store refused the photo")
    )
)]
pub async fn upload_photo(
    AuthUser { uid, .. }: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UserProfile>> {
    let mut photo = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() == Some("photo") {
            photo = Some(read_file(field).await?);
        }
    }

    let photo = photo.ok_or(ValidationError::MissingField("photo"))?;
    if !photo.content_type.starts_with("image/") {
        return Err(ValidationError::Malformed(format!(
            "profile photo must be an image, got {}",
            photo.content_type
        ))
        .into());
    }

    let url = state.storage.upload(&uid, &photo).await?;
    state
        .repo
        .set_photo_url(&uid, &url)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("user {uid}")))
}

/// get_my_resources
///
/// [Authenticated Route] Everything the caller uploaded, pending and approved.
#[utoipa::path(
    get,
    path = "/me/resources",
    responses((status = 200, description = "My uploads", body = [ResourceRecord]))
)]
pub async fn get_my_resources(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ResourceRecord>>> {
    Ok(Json(moderation::list_mine(state.repo.as_ref(), &user).await?))
}

// --- Resources ---

/// list_resources
///
/// [Authenticated Route] The approved repository, filtered and searched.
#[utoipa::path(
    get,
    path = "/resources",
    params(ResourceFilter),
    responses((status = 200, description = "Approved resources", body = [ResourceRecord]))
)]
pub async fn list_resources(
    State(state): State<AppState>,
    Query(filter): Query<ResourceFilter>,
) -> AppResult<Json<Vec<ResourceRecord>>> {
    Ok(Json(
        moderation::list_approved(state.repo.as_ref(), &filter).await?,
    ))
}

/// list_pending
///
/// [Authenticated Route] The review queue. Contributors and admins only.
#[utoipa::path(
    get,
    path = "/resources/pending",
    responses(
        (status = 200, description = "Pending resources", body = [ResourceRecord]),
        (status = 403, description = "Viewer")
    )
)]
pub async fn list_pending(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ResourceRecord>>> {
    Ok(Json(moderation::list_pending(state.repo.as_ref(), &user).await?))
}

/// create_resource
///
/// [Authenticated Route] Submits a resource as `multipart/form-data`: one
/// `metadata` JSON part (`SubmitResourceRequest`) and zero or more `files`.
/// Viewer submissions land in the pending queue; contributor and admin
/// submissions are published immediately.
#[utoipa::path(
    post,
    path = "/resources",
    request_body(content = SubmitResourceRequest, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Created", body = ResourceRecord),
        (status = 400, description = "Validation failed"),
        (status = 413, description = "Body over the upload limit"),
        (status = 502, description = "Upload failed")
    )
)]
pub async fn create_resource(
    user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<ResourceRecord>)> {
    let (metadata, files) = read_submission::<SubmitResourceRequest>(multipart).await?;
    let metadata = metadata.ok_or(ValidationError::MissingField("metadata"))?;

    let record = moderation::submit(
        state.repo.as_ref(),
        state.media.as_ref(),
        &user,
        metadata,
        files,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// get_resource
///
/// [Authenticated Route] A single record. Pending records are only visible
/// to their uploader and to reviewers.
#[utoipa::path(
    get,
    path = "/resources/{id}",
    params(("id" = Uuid, Path, description = "Resource ID")),
    responses(
        (status = 200, description = "Found", body = ResourceRecord),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_resource(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ResourceRecord>> {
    Ok(Json(moderation::get(state.repo.as_ref(), &user, id).await?))
}

/// update_resource
///
/// [Authenticated Route] Partial edit by the owner (contributor or admin).
/// Same multipart layout as submission; `metadata` is
/// `UpdateResourceRequest` and may be omitted when only files are added.
#[utoipa::path(
    patch,
    path = "/resources/{id}",
    params(("id" = Uuid, Path, description = "Resource ID")),
    request_body(content = UpdateResourceRequest, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Updated", body = ResourceRecord),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found"),
        (status = 413, description = "Body over the upload limit")
    )
)]
pub async fn update_resource(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ResourceRecord>> {
    let (metadata, files) = read_submission::<UpdateResourceRequest>(multipart).await?;

    let record = moderation::edit(
        state.repo.as_ref(),
        state.media.as_ref(),
        &user,
        id,
        metadata.unwrap_or_default(),
        files,
    )
    .await?;
    Ok(Json(record))
}

/// delete_resource
///
/// [Authenticated Route] Owner delete (contributor or admin), pending or
/// approved.
#[utoipa::path(
    delete,
    path = "/resources/{id}",
    params(("id" = Uuid, Path, description = "Resource ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_resource(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    moderation::delete(state.repo.as_ref(), &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// approve_resource
///
/// [Authenticated Route] Publishes a pending record under its original id.
#[utoipa::path(
    post,
    path = "/resources/{id}/approve",
    params(("id" = Uuid, Path, description = "Resource ID")),
    responses(
        (status = 200, description = "Approved", body = ResourceRecord),
        (status = 403, description = "Viewer"),
        (status = 404, description = "Not pending")
    )
)]
pub async fn approve_resource(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ResourceRecord>> {
    Ok(Json(moderation::approve(state.repo.as_ref(), &user, id).await?))
}

/// reject_resource
///
/// [Authenticated Route] Permanently deletes a pending record.
#[utoipa::path(
    post,
    path = "/resources/{id}/reject",
    params(("id" = Uuid, Path, description = "Resource ID")),
    responses(
        (status = 204, description = "Rejected"),
        (status = 403, description = "Viewer"),
        (status = 404, description = "Not pending")
    )
)]
pub async fn reject_resource(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    moderation::reject(state.repo.as_ref(), &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// report_resource
///
/// [Authenticated Route] Flags an approved resource. `reason` is mandatory.
#[utoipa::path(
    post,
    path = "/resources/{id}/report",
    params(("id" = Uuid, Path, description = "Resource ID")),
    request_body = CreateReportRequest,
    responses(
        (status = 201, description = "Reported", body = Report),
        (status = 400, description = "Empty reason"),
        (status = 404, description = "Not an approved resource")
    )
)]
pub async fn report_resource(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateReportRequest>,
) -> AppResult<(StatusCode, Json<Report>)> {
    let report = reports::report(state.repo.as_ref(), &user, id, &payload.reason).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

// --- Admin ---

/// set_role
///
/// [Admin Route] Changes a user's role. Always answers with
/// `{ success, message? }`: 400 for missing or unknown fields, 403 for
/// non-admins, 500 when the provider or store fails.
#[utoipa::path(
    post,
    path = "/admin/set-role",
    request_body = SetRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = SetRoleResponse),
        (status = 400, description = "Missing UID or role", body = SetRoleResponse),
        (status = 403, description = "Not an admin", body = SetRoleResponse),
        (status = 500, description = "Provider or profile store failure", body = SetRoleResponse)
    )
)]
pub async fn set_role(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<SetRoleRequest>,
) -> (StatusCode, Json<SetRoleResponse>) {
    match roles::change_role(state.repo.as_ref(), state.identity.as_ref(), &user, &payload).await {
        Ok(_) => (
            StatusCode::OK,
            Json(SetRoleResponse {
                success: true,
                message: None,
            }),
        ),
        Err(e) => {
            let message = match &e {
                AppError::Validation(ValidationError::MissingField(_)) => {
                    "Missing UID or role".to_string()
                }
                AppError::Database(_) | AppError::Downstream(_) => {
                    tracing::error!("set-role failed: {}", e);
                    e.to_string()
                }
                other => other.to_string(),
            };
            (
                e.status_code(),
                Json(SetRoleResponse {
                    success: false,
                    message: Some(message),
                }),
            )
        }
    }
}

/// find_user
///
/// [Admin Route] Looks a profile up by email.
#[utoipa::path(
    get,
    path = "/admin/users",
    params(EmailQuery),
    responses(
        (status = 200, description = "Found", body = UserProfile),
        (status = 404, description = "No such email")
    )
)]
pub async fn find_user(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(
        roles::find_by_email(state.repo.as_ref(), &user, &query.email).await?,
    ))
}

/// list_reports
///
/// [Admin Route] Every open report, newest first.
#[utoipa::path(
    get,
    path = "/admin/reports",
    responses((status = 200, description = "Open reports", body = [Report]))
)]
pub async fn list_reports(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Report>>> {
    Ok(Json(reports::list(state.repo.as_ref(), &user).await?))
}

/// resolve_report
///
/// [Admin Route] Resolves a report by deleting the resource, warning its
/// uploader, or returning the edit path.
#[utoipa::path(
    post,
    path = "/admin/reports/{id}/resolve",
    params(("id" = Uuid, Path, description = "Report ID")),
    request_body = ResolveReportRequest,
    responses(
        (status = 200, description = "Resolved", body = ReportResolution),
        (status = 404, description = "Not Found"),
        (status = 500, description = "Partially completed")
    )
)]
pub async fn resolve_report(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResolveReportRequest>,
) -> AppResult<Json<ReportResolution>> {
    Ok(Json(
        reports::resolve(
            state.repo.as_ref(),
            state.notifier.as_ref(),
            &user,
            id,
            payload,
        )
        .await?,
    ))
}

/// get_admin_stats
///
/// [Admin Route] Dashboard counters.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses((status = 200, description = "Stats", body = AdminDashboardStats))
)]
pub async fn get_admin_stats(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<AdminDashboardStats>> {
    policy::ensure(policy::can_change_role(&user), "view stats")?;
    Ok(Json(state.repo.get_stats().await?))
}
