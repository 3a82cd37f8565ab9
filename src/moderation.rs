//! Moderation engine.
//!
//! Owns the pending -> approved / rejected state machine and the edit and
//! delete operations on resource records. Validation and authorization always
//! run before anything is uploaded or written.

use url::Url;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult, ValidationError},
    media::MediaUploader,
    models::{
        Container, NewResource, ResourceFilter, ResourceRecord, ResourceType, Role,
        SubmitResourceRequest, UpdateResourceRequest, UploadFile,
    },
    policy::{self, ResourceAction},
    repository::Repository,
};

/// Viewers go through the pending queue; everyone else publishes directly.
pub fn target_container(role: Role) -> Container {
    if role.is_reviewer() {
        Container::Approved
    } else {
        Container::Pending
    }
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

fn require_core_fields(title: &str, code: &str, year: &str) -> Result<(), ValidationError> {
    require(title, "course title")?;
    require(code, "course code")?;
    require(year, "year")
}

/// Parses `link` as an absolute http(s) URL and returns it trimmed.
pub fn validate_link(link: Option<&str>) -> Result<String, ValidationError> {
    let raw = link.map(str::trim).unwrap_or_default();
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
            Ok(raw.to_string())
        }
        _ => Err(ValidationError::InvalidUrl(raw.to_string())),
    }
}

/// validate_submission
///
/// Fail-fast checks on a new submission. `file_count` is the number of file
/// parts that came with it.
pub fn validate_submission(
    req: &SubmitResourceRequest,
    file_count: usize,
) -> Result<(), ValidationError> {
    require_core_fields(&req.course_title, &req.course_code, &req.year)?;
    match req.resource_type {
        ResourceType::Link => validate_link(req.link.as_deref()).map(|_| ()),
        _ if file_count == 0 => Err(ValidationError::EmptyFileSet),
        _ => Ok(()),
    }
}

/// upload_all
///
/// Uploads sequentially, preserving order. If a file fails after earlier ones
/// succeeded, those URLs are returned as orphaned in a `PartialFailure`.
pub async fn upload_all(media: &dyn MediaUploader, files: &[UploadFile]) -> AppResult<Vec<String>> {
    let mut urls = Vec::with_capacity(files.len());
    for file in files {
        match media.upload(file).await {
            Ok(url) => urls.push(url),
            Err(e) if urls.is_empty() => return Err(e),
            Err(e) => return Err(orphaned(format!("upload aborted: {e}"), urls)),
        }
    }
    Ok(urls)
}

fn orphaned(message: String, urls: Vec<String>) -> AppError {
    tracing::warn!(orphaned = ?urls, "{}", message);
    AppError::PartialFailure {
        message,
        orphaned: urls,
    }
}

/// submit
///
/// Validates, uploads the files (or takes the link) and writes the record
/// into the container chosen by the submitter's role.
pub async fn submit(
    repo: &dyn Repository,
    media: &dyn MediaUploader,
    actor: &AuthUser,
    req: SubmitResourceRequest,
    files: Vec<UploadFile>,
) -> AppResult<ResourceRecord> {
    validate_submission(&req, files.len())?;

    let (urls, uploaded) = match req.resource_type {
        ResourceType::Link => (vec![validate_link(req.link.as_deref())?], false),
        _ => (upload_all(media, &files).await?, true),
    };

    let container = target_container(actor.role);
    let new = NewResource {
        course_title: req.course_title.trim().to_string(),
        description: req.description,
        resource_type: req.resource_type,
        course_code: req.course_code.trim().to_string(),
        year: req.year.trim().to_string(),
        semester: req.semester,
        branch: req.branch,
        professor: req.professor,
        urls: urls.clone(),
        uploaded_by: actor.as_user_ref(),
    };

    let record = match repo.create_resource(container, new).await {
        Ok(record) => record,
        Err(e) if uploaded => return Err(orphaned(format!("record write failed: {e}"), urls)),
        Err(e) => return Err(e),
    };

    tracing::info!(
        resource_id = %record.id,
        uid = %actor.uid,
        container = ?container,
        "resource submitted"
    );
    Ok(record)
}

/// Finds a record in either container.
pub async fn locate(repo: &dyn Repository, id: Uuid) -> AppResult<(Container, ResourceRecord)> {
    for container in [Container::Approved, Container::Pending] {
        if let Some(record) = repo.get_resource(container, id).await? {
            return Ok((container, record));
        }
    }
    Err(AppError::not_found(format!("resource {id}")))
}

/// Pending records the actor may not see are reported as missing.
pub async fn get(repo: &dyn Repository, actor: &AuthUser, id: Uuid) -> AppResult<ResourceRecord> {
    let (container, record) = locate(repo, id).await?;
    if !policy::can_view(actor, &record, container) {
        return Err(AppError::not_found(format!("resource {id}")));
    }
    Ok(record)
}

/// approve
///
/// Moves a pending record into the approved container under the same id.
/// When two reviewers race, exactly one wins and the other sees `NotFound`.
pub async fn approve(repo: &dyn Repository, actor: &AuthUser, id: Uuid) -> AppResult<ResourceRecord> {
    policy::ensure(policy::can_review(actor), ResourceAction::Approve.as_str())?;

    let record = repo
        .approve_pending(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("pending resource {id}")))?;

    tracing::info!(resource_id = %id, reviewer = %actor.uid, "resource approved");
    Ok(record)
}

/// Deletes a pending record permanently.
pub async fn reject(repo: &dyn Repository, actor: &AuthUser, id: Uuid) -> AppResult<()> {
    policy::ensure(policy::can_review(actor), ResourceAction::Reject.as_str())?;

    if !repo.delete_resource(Container::Pending, id).await? {
        return Err(AppError::not_found(format!("pending resource {id}")));
    }
    tracing::info!(resource_id = %id, reviewer = %actor.uid, "resource rejected");
    Ok(())
}

/// edit
///
/// Applies a partial update in whichever container holds the record. The
/// result must still pass submission validation. New files are appended after
/// the existing URLs; switching between link and file types replaces them.
pub async fn edit(
    repo: &dyn Repository,
    media: &dyn MediaUploader,
    actor: &AuthUser,
    id: Uuid,
    req: UpdateResourceRequest,
    files: Vec<UploadFile>,
) -> AppResult<ResourceRecord> {
    let (container, current) = locate(repo, id).await?;
    policy::authorize(actor, &current, ResourceAction::Edit)?;

    let mut updated = current.clone();
    if let Some(v) = req.course_title {
        updated.course_title = v.trim().to_string();
    }
    if let Some(v) = req.description {
        updated.description = v;
    }
    if let Some(v) = req.resource_type {
        updated.resource_type = v;
    }
    if let Some(v) = req.course_code {
        updated.course_code = v.trim().to_string();
    }
    if let Some(v) = req.year {
        updated.year = v.trim().to_string();
    }
    if let Some(v) = req.semester {
        updated.semester = v;
    }
    if let Some(v) = req.branch {
        updated.branch = v;
    }
    if let Some(v) = req.professor {
        updated.professor = v;
    }

    require_core_fields(&updated.course_title, &updated.course_code, &updated.year)?;
    let same_kind = updated.resource_type.is_file() == current.resource_type.is_file();

    if updated.resource_type == ResourceType::Link {
        if !files.is_empty() {
            return Err(ValidationError::Malformed(
                "files cannot be attached to a link resource".to_string(),
            )
            .into());
        }
        let link = match req.link.as_deref() {
            Some(link) => Some(link),
            None if same_kind => current.urls.first().map(String::as_str),
            None => None,
        };
        updated.urls = vec![validate_link(link)?];
    } else {
        if req.link.is_some() {
            return Err(ValidationError::Malformed(
                "link only applies to link resources".to_string(),
            )
            .into());
        }
        if !same_kind {
            updated.urls.clear();
        }
        if updated.urls.is_empty() && files.is_empty() {
            return Err(ValidationError::EmptyFileSet.into());
        }
        updated.urls.extend(upload_all(media, &files).await?);
    }

    let new_urls: Vec<String> = updated
        .urls
        .iter()
        .filter(|url| !current.urls.contains(url))
        .cloned()
        .collect();

    let saved = match repo.update_resource(container, &updated).await {
        Ok(Some(saved)) => saved,
        Ok(None) if !files.is_empty() => {
            return Err(orphaned(
                format!("resource {id} disappeared during edit"),
                new_urls,
            ));
        }
        Ok(None) => return Err(AppError::not_found(format!("resource {id}"))),
        Err(e) if !files.is_empty() => {
            return Err(orphaned(format!("record write failed: {e}"), new_urls));
        }
        Err(e) => return Err(e),
    };

    tracing::info!(resource_id = %id, uid = %actor.uid, "resource edited");
    Ok(saved)
}

/// delete
///
/// Owner delete in either container. Reports against an approved record go
/// with it.
pub async fn delete(repo: &dyn Repository, actor: &AuthUser, id: Uuid) -> AppResult<()> {
    let (container, record) = locate(repo, id).await?;
    policy::authorize(actor, &record, ResourceAction::Delete)?;

    if !repo.delete_resource(container, id).await? {
        return Err(AppError::not_found(format!("resource {id}")));
    }

    if container == Container::Approved {
        if let Err(e) = repo.delete_reports_for_resource(id).await {
            return Err(AppError::PartialFailure {
                message: format!("resource {id} deleted but its reports remain: {e}"),
                orphaned: Vec::new(),
            });
        }
    }

    tracing::info!(resource_id = %id, uid = %actor.uid, "resource deleted");
    Ok(())
}

pub async fn list_approved(
    repo: &dyn Repository,
    filter: &ResourceFilter,
) -> AppResult<Vec<ResourceRecord>> {
    repo.list_resources(Container::Approved, filter).await
}

/// The review queue. Reviewers only.
pub async fn list_pending(repo: &dyn Repository, actor: &AuthUser) -> AppResult<Vec<ResourceRecord>> {
    policy::ensure(policy::can_review(actor), "view the pending queue")?;
    repo.list_resources(Container::Pending, &ResourceFilter::default())
        .await
}

pub async fn list_mine(repo: &dyn Repository, actor: &AuthUser) -> AppResult<Vec<ResourceRecord>> {
    repo.list_user_resources(&actor.uid).await
}
