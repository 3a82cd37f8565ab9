//! Report queue.
//!
//! Flags raised against approved resources, and the admin-only resolutions:
//! delete the resource, warn its uploader, or hand off to the edit flow.

use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult, ValidationError},
    models::{Container, Report, ReportResolution, ResolutionAction, ResolveReportRequest},
    notify::Notifier,
    policy::{self, ResourceAction},
    repository::Repository,
};

/// report
///
/// Files a report against an approved resource. The uploader may report
/// their own resource.
pub async fn report(
    repo: &dyn Repository,
    actor: &AuthUser,
    resource_id: Uuid,
    reason: &str,
) -> AppResult<Report> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ValidationError::EmptyReason.into());
    }

    let record = repo
        .get_resource(Container::Approved, resource_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("approved resource {resource_id}")))?;
    policy::authorize(actor, &record, ResourceAction::Report)?;

    let report = repo
        .create_report(resource_id, &record.course_code, reason, actor.as_user_ref())
        .await?;

    tracing::info!(report_id = %report.id, resource_id = %resource_id, uid = %actor.uid, "resource reported");
    Ok(report)
}

/// Open reports, newest first. Admin only.
pub async fn list(repo: &dyn Repository, actor: &AuthUser) -> AppResult<Vec<Report>> {
    policy::ensure(policy::can_resolve_report(actor), "list reports")?;
    repo.list_reports().await
}

/// resolve
///
/// - `DeleteResource`: removes the resource, then every report against it.
///   If the second step fails the first is not undone and a
///   `PartialFailure` comes back.
/// - `Warn`: notifies the uploader (or `req.email`). The report stays open.
/// - `EditResource`: returns the edit path; nothing is mutated.
pub async fn resolve(
    repo: &dyn Repository,
    notifier: &dyn Notifier,
    actor: &AuthUser,
    report_id: Uuid,
    req: ResolveReportRequest,
) -> AppResult<ReportResolution> {
    policy::ensure(policy::can_resolve_report(actor), "resolve reports")?;

    let report = repo
        .get_report(report_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("report {report_id}")))?;
    let resource_id = report.resource_id;

    let mut resolution = ReportResolution {
        action: req.action,
        resource_id,
        reports_removed: 0,
        notified: None,
        edit_path: None,
    };

    match req.action {
        ResolutionAction::DeleteResource => {
            let deleted = repo.delete_resource(Container::Approved, resource_id).await?;
            match repo.delete_reports_for_resource(resource_id).await {
                Ok(removed) => resolution.reports_removed = removed,
                Err(e) if deleted => {
                    return Err(AppError::PartialFailure {
                        message: format!(
                            "resource {resource_id} deleted but its reports could not be removed: {e}"
                        ),
                        orphaned: Vec::new(),
                    });
                }
                Err(e) => return Err(e),
            }
            tracing::info!(
                report_id = %report_id,
                resource_id = %resource_id,
                resource_deleted = deleted,
                reports_removed = resolution.reports_removed,
                "report resolved by deletion"
            );
        }
        ResolutionAction::Warn => {
            let email = match req.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
                Some(email) => email.to_string(),
                None => repo
                    .get_resource(Container::Approved, resource_id)
                    .await?
                    .map(|record| record.uploaded_by.email)
                    .ok_or_else(|| AppError::not_found(format!("approved resource {resource_id}")))?,
            };
            let message = req.message.unwrap_or_else(|| {
                format!(
                    "Your resource for {} was reported: {}",
                    report.course_code, report.reason
                )
            });
            notifier.notify_user(&email, &message).await?;
            tracing::info!(report_id = %report_id, to = %email, "uploader warned");
            resolution.notified = Some(email);
        }
        ResolutionAction::EditResource => {
            if repo
                .get_resource(Container::Approved, resource_id)
                .await?
                .is_none()
            {
                return Err(AppError::not_found(format!("approved resource {resource_id}")));
            }
            resolution.edit_path = Some(format!("/resources/{resource_id}"));
        }
    }

    Ok(resolution)
}
