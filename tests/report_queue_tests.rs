use semstore::{
    auth::AuthUser,
    error::{AppError, ValidationError},
    models::{
        Container, NewResource, ResolutionAction, ResolveReportRequest, ResourceRecord,
        ResourceType, Role, UserRef,
    },
    notify::RecordingNotifier,
    reports,
    repository::{InMemoryRepository, Repository},
};
use std::sync::atomic::Ordering;

// --- Helpers ---

fn actor(uid: &str, role: Role) -> AuthUser {
    AuthUser {
        uid: uid.to_string(),
        name: format!("User {uid}"),
        email: format!("{uid}@iitgn.ac.in"),
        role,
        issued_at: None,
    }
}

async fn seed_resource(repo: &InMemoryRepository, container: Container) -> ResourceRecord {
    repo.create_resource(
        container,
        NewResource {
            course_title: "Signals".to_string(),
            resource_type: ResourceType::Pdf,
            course_code: "EE201".to_string(),
            year: "2023".to_string(),
            urls: vec!["https://media.test/x.pdf".to_string()],
            uploaded_by: UserRef {
                uid: "uploader".to_string(),
                name: "Uploader".to_string(),
                email: "uploader@iitgn.ac.in".to_string(),
            },
            ..NewResource::default()
        },
    )
    .await
    .unwrap()
}

fn resolve_with(action: ResolutionAction) -> ResolveReportRequest {
    ResolveReportRequest {
        action,
        email: None,
        message: None,
    }
}

// --- Filing ---

#[tokio::test]
async fn test_report_then_delete_resolution_removes_resource_and_report() {
    let repo = InMemoryRepository::new();
    let notifier = RecordingNotifier::new();
    let record = seed_resource(&repo, Container::Approved).await;

    let report = reports::report(&repo, &actor("u1", Role::Viewer), record.id, "outdated")
        .await
        .unwrap();

    assert_eq!(report.resource_id, record.id);
    assert_eq!(report.reason, "outdated");
    assert_eq!(report.course_code, "EE201");
    assert_eq!(repo.list_reports_for_resource(record.id).await.unwrap().len(), 1);

    let resolution = reports::resolve(
        &repo,
        &notifier,
        &actor("admin", Role::Admin),
        report.id,
        resolve_with(ResolutionAction::DeleteResource),
    )
    .await
    .unwrap();

    assert_eq!(resolution.reports_removed, 1);
    assert!(repo.get_resource(Container::Approved, record.id).await.unwrap().is_none());
    assert!(repo.get_report(report.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_multiple_reports_per_resource_all_removed_on_delete() {
    let repo = InMemoryRepository::new();
    let notifier = RecordingNotifier::new();
    let record = seed_resource(&repo, Container::Approved).await;

    let first = reports::report(&repo, &actor("u1", Role::Viewer), record.id, "wrong course")
        .await
        .unwrap();
    reports::report(&repo, &actor("u2", Role::Contributor), record.id, "duplicate")
        .await
        .unwrap();
    // The uploader may report their own resource.
    reports::report(&repo, &actor("uploader", Role::Viewer), record.id, "mistake")
        .await
        .unwrap();
    assert_eq!(repo.list_reports().await.unwrap().len(), 3);

    let resolution = reports::resolve(
        &repo,
        &notifier,
        &actor("admin", Role::Admin),
        first.id,
        resolve_with(ResolutionAction::DeleteResource),
    )
    .await
    .unwrap();

    assert_eq!(resolution.reports_removed, 3);
    assert!(repo.list_reports().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reason_is_mandatory() {
    let repo = InMemoryRepository::new();
    let record = seed_resource(&repo, Container::Approved).await;

    let err = reports::report(&repo, &actor("u1", Role::Viewer), record.id, "   ")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(ValidationError::EmptyReason)));
    assert!(repo.list_reports().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pending_resources_cannot_be_reported() {
    let repo = InMemoryRepository::new();
    let record = seed_resource(&repo, Container::Pending).await;

    let err = reports::report(&repo, &actor("u1", Role::Viewer), record.id, "spam")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// --- Resolution ---

#[tokio::test]
async fn test_only_admins_resolve() {
    let repo = InMemoryRepository::new();
    let notifier = RecordingNotifier::new();
    let record = seed_resource(&repo, Container::Approved).await;
    let report = reports::report(&repo, &actor("u1", Role::Viewer), record.id, "spam")
        .await
        .unwrap();

    for role in [Role::Viewer, Role::Contributor] {
        let err = reports::resolve(
            &repo,
            &notifier,
            &actor("x", role),
            report.id,
            resolve_with(ResolutionAction::DeleteResource),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
    assert!(repo.get_resource(Container::Approved, record.id).await.unwrap().is_some());
    assert!(reports::list(&repo, &actor("c", Role::Contributor)).await.is_err());
}

#[tokio::test]
async fn test_warn_notifies_uploader_and_keeps_report_open() {
    let repo = InMemoryRepository::new();
    let notifier = RecordingNotifier::new();
    let record = seed_resource(&repo, Container::Approved).await;
    let report = reports::report(&repo, &actor("u1", Role::Viewer), record.id, "blurry scan")
        .await
        .unwrap();

    let resolution = reports::resolve(
        &repo,
        &notifier,
        &actor("admin", Role::Admin),
        report.id,
        resolve_with(ResolutionAction::Warn),
    )
    .await
    .unwrap();

    assert_eq!(resolution.notified.as_deref(), Some("uploader@iitgn.ac.in"));
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "uploader@iitgn.ac.in");
    assert!(sent[0].1.contains("blurry scan"));
    assert!(repo.get_report(report.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_warn_honours_explicit_target() {
    let repo = InMemoryRepository::new();
    let notifier = RecordingNotifier::new();
    let record = seed_resource(&repo, Container::Approved).await;
    let report = reports::report(&repo, &actor("u1", Role::Viewer), record.id, "spam")
        .await
        .unwrap();

    reports::resolve(
        &repo,
        &notifier,
        &actor("admin", Role::Admin),
        report.id,
        ResolveReportRequest {
            action: ResolutionAction::Warn,
            email: Some("ta@iitgn.ac.in".to_string()),
            message: Some("Please fix the upload".to_string()),
        },
    )
    .await
    .unwrap();

    assert_eq!(
        notifier.sent(),
        vec![(
            "ta@iitgn.ac.in".to_string(),
            "Please fix the upload".to_string()
        )]
    );
}

#[tokio::test]
async fn test_warn_can_target_the_reporter() {
    let repo = InMemoryRepository::new();
    let notifier = RecordingNotifier::new();
    let record = seed_resource(&repo, Container::Approved).await;
    let report = reports::report(&repo, &actor("u1", Role::Viewer), record.id, "spam")
        .await
        .unwrap();

    reports::resolve(
        &repo,
        &notifier,
        &actor("admin", Role::Admin),
        report.id,
        ResolveReportRequest {
            action: ResolutionAction::Warn,
            email: Some(report.reported_by.email.clone()),
            message: None,
        },
    )
    .await
    .unwrap();

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, report.reported_by.email);
    assert_ne!(sent[0].0, record.uploaded_by.email);
}

#[tokio::test]
async fn test_warn_surfaces_notifier_failure() {
    let repo = InMemoryRepository::new();
    let notifier = RecordingNotifier::new_failing();
    let record = seed_resource(&repo, Container::Approved).await;
    let report = reports::report(&repo, &actor("u1", Role::Viewer), record.id, "spam")
        .await
        .unwrap();

    let err = reports::resolve(
        &repo,
        &notifier,
        &actor("admin", Role::Admin),
        report.id,
        resolve_with(ResolutionAction::Warn),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Downstream(_)));
}

#[tokio::test]
async fn test_edit_resolution_points_at_edit_route_without_mutating() {
    let repo = InMemoryRepository::new();
    let notifier = RecordingNotifier::new();
    let record = seed_resource(&repo, Container::Approved).await;
    let report = reports::report(&repo, &actor("u1", Role::Viewer), record.id, "typo")
        .await
        .unwrap();

    let resolution = reports::resolve(
        &repo,
        &notifier,
        &actor("admin", Role::Admin),
        report.id,
        resolve_with(ResolutionAction::EditResource),
    )
    .await
    .unwrap();

    assert_eq!(resolution.edit_path, Some(format!("/resources/{}", record.id)));
    assert!(repo.get_report(report.id).await.unwrap().is_some());
    assert_eq!(
        repo.get_resource(Container::Approved, record.id).await.unwrap(),
        Some(record)
    );
}

#[tokio::test]
async fn test_report_deletion_failure_is_partial_and_not_rolled_back() {
    let repo = InMemoryRepository::new();
    let notifier = RecordingNotifier::new();
    let record = seed_resource(&repo, Container::Approved).await;
    let report = reports::report(&repo, &actor("u1", Role::Viewer), record.id, "spam")
        .await
        .unwrap();

    repo.fail_report_deletes.store(true, Ordering::SeqCst);

    let err = reports::resolve(
        &repo,
        &notifier,
        &actor("admin", Role::Admin),
        report.id,
        resolve_with(ResolutionAction::DeleteResource),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::PartialFailure { .. }));
    assert!(repo.get_resource(Container::Approved, record.id).await.unwrap().is_none());
    assert!(repo.get_report(report.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unknown_report_is_not_found() {
    let repo = InMemoryRepository::new();
    let notifier = RecordingNotifier::new();

    let err = reports::resolve(
        &repo,
        &notifier,
        &actor("admin", Role::Admin),
        uuid::Uuid::new_v4(),
        resolve_with(ResolutionAction::Warn),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
