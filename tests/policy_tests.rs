use semstore::{
    auth::AuthUser,
    models::{Container, ResourceRecord, Role, UserRef},
    policy::{self, ResourceAction},
};

// --- Helpers ---

fn actor(uid: &str, role: Role) -> AuthUser {
    AuthUser {
        uid: uid.to_string(),
        name: uid.to_string(),
        email: format!("{uid}@iitgn.ac.in"),
        role,
        issued_at: None,
    }
}

fn record_owned_by(uid: &str) -> ResourceRecord {
    ResourceRecord {
        course_code: "CS101".to_string(),
        uploaded_by: UserRef {
            uid: uid.to_string(),
            name: uid.to_string(),
            email: format!("{uid}@iitgn.ac.in"),
        },
        ..ResourceRecord::default()
    }
}

// --- Tests ---

#[test]
fn test_edit_and_delete_require_ownership_and_non_viewer_role() {
    let record = record_owned_by("owner");

    for role in Role::ALL {
        for uid in ["owner", "someone-else"] {
            let user = actor(uid, role);
            let expected = uid == "owner" && role != Role::Viewer;
            for action in [ResourceAction::Edit, ResourceAction::Delete] {
                assert_eq!(
                    policy::can_mutate(&user, &record, action),
                    expected,
                    "{uid} as {role} on {}",
                    action.as_str()
                );
            }
        }
    }
}

#[test]
fn test_admin_is_not_exempt_from_ownership() {
    let record = record_owned_by("owner");
    let admin = actor("admin-1", Role::Admin);

    assert!(!policy::can_mutate(&admin, &record, ResourceAction::Edit));
    assert!(policy::authorize(&admin, &record, ResourceAction::Delete).is_err());
}

#[test]
fn test_approve_and_reject_ignore_ownership() {
    for role in Role::ALL {
        for uid in ["owner", "reviewer"] {
            let user = actor(uid, role);
            let record = record_owned_by("owner");
            let expected = matches!(role, Role::Contributor | Role::Admin);
            assert_eq!(policy::can_mutate(&user, &record, ResourceAction::Approve), expected);
            assert_eq!(policy::can_mutate(&user, &record, ResourceAction::Reject), expected);
        }
    }
}

#[test]
fn test_anyone_may_report_including_the_uploader() {
    let record = record_owned_by("owner");
    for role in Role::ALL {
        assert!(policy::can_mutate(&actor("owner", role), &record, ResourceAction::Report));
        assert!(policy::can_mutate(&actor("other", role), &record, ResourceAction::Report));
    }
}

#[test]
fn test_role_changes_and_resolutions_are_admin_only() {
    assert!(policy::can_change_role(&actor("a", Role::Admin)));
    assert!(!policy::can_change_role(&actor("c", Role::Contributor)));
    assert!(!policy::can_change_role(&actor("v", Role::Viewer)));

    assert!(policy::can_resolve_report(&actor("a", Role::Admin)));
    assert!(!policy::can_resolve_report(&actor("c", Role::Contributor)));
}

#[test]
fn test_pending_visibility() {
    let record = record_owned_by("owner");

    assert!(policy::can_view(&actor("owner", Role::Viewer), &record, Container::Pending));
    assert!(!policy::can_view(&actor("other", Role::Viewer), &record, Container::Pending));
    assert!(policy::can_view(&actor("other", Role::Contributor), &record, Container::Pending));
    assert!(policy::can_view(&actor("other", Role::Viewer), &record, Container::Approved));
}

#[test]
fn test_denial_maps_to_forbidden() {
    let record = record_owned_by("owner");
    let err = policy::authorize(&actor("other", Role::Viewer), &record, ResourceAction::Edit)
        .unwrap_err();

    assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    assert_eq!(err.error_code(), "FORBIDDEN");
}
