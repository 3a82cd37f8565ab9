use chrono::Utc;
use semstore::{
    error::ValidationError,
    models::{
        Identity, ResolutionAction, ResolveReportRequest, ResourceRecord, ResourceType, Role,
        SubmitResourceRequest, UpdateProfileRequest, UpdateResourceRequest, UserRef,
    },
};
use serde_json::json;
use uuid::Uuid;

// --- Serialization Shape ---

#[test]
fn test_resource_record_json_uses_wire_names() {
    let record = ResourceRecord {
        id: Uuid::new_v4(),
        course_title: "Linear Algebra".to_string(),
        resource_type: ResourceType::Pdf,
        course_code: "MA101".to_string(),
        year: "2024".to_string(),
        urls: vec!["https://media.test/a.pdf".to_string()],
        uploaded_by: UserRef {
            uid: "uid-a".to_string(),
            name: "A".to_string(),
            email: "a@iitgn.ac.in".to_string(),
        },
        timestamp: Utc::now(),
        ..Default::default()
    };

    let value = serde_json::to_value(&record).unwrap();

    // CRITICAL: the resource kind travels as "type", not "resourceType"
    assert_eq!(value["type"], "pdf");
    assert!(value.get("resourceType").is_none());
    assert_eq!(value["courseCode"], "MA101");
    assert_eq!(value["uploadedBy"]["uid"], "uid-a");
    assert_eq!(value["approved"], false);
}

#[test]
fn test_identity_uses_photo_url_casing() {
    let identity = Identity {
        uid: "uid-a".to_string(),
        display_name: "A".to_string(),
        email: "a@iitgn.ac.in".to_string(),
        photo_url: "https://photos.test/a.png".to_string(),
        role: Role::Contributor,
    };

    let json_output = serde_json::to_string(&identity).unwrap();
    assert!(json_output.contains(r#""photoURL":"https://photos.test/a.png""#));
    assert!(json_output.contains(r#""displayName":"A""#));
    assert!(json_output.contains(r#""role":"contributor""#));
}

// --- Input Schemas ---

#[test]
fn test_submit_request_defaults_missing_text_fields() {
    let req: SubmitResourceRequest = serde_json::from_value(json!({
        "type": "link",
        "courseTitle": "Signals",
        "link": "https://example.com/notes"
    }))
    .unwrap();

    assert_eq!(req.resource_type, ResourceType::Link);
    assert_eq!(req.course_code, "");
    assert_eq!(req.link.as_deref(), Some("https://example.com/notes"));
}

#[test]
fn test_submit_request_rejects_unknown_type() {
    let result: Result<SubmitResourceRequest, _> = serde_json::from_value(json!({
        "type": "video",
        "courseTitle": "Signals"
    }));
    assert!(result.is_err());
}

#[test]
fn test_update_resource_request_optionality() {
    // Partial updates: every field is optional and None fields are omitted.
    let partial_update = UpdateResourceRequest {
        course_title: Some("New Title Only".to_string()),
        ..Default::default()
    };

    let json_output = serde_json::to_string(&partial_update).unwrap();
    assert_eq!(json_output, r#"{"courseTitle":"New Title Only"}"#);
}

#[test]
fn test_update_resource_request_rejects_unknown_fields() {
    let result: Result<UpdateResourceRequest, _> = serde_json::from_value(json!({
        "courseTitle": "x",
        "approved": true
    }));
    assert!(result.is_err(), "approval cannot be smuggled through an edit");
}

#[test]
fn test_profile_update_cannot_carry_role() {
    let result: Result<UpdateProfileRequest, _> = serde_json::from_value(json!({
        "name": "Mallory",
        "role": "admin"
    }));
    assert!(result.is_err());

    let ok: UpdateProfileRequest =
        serde_json::from_value(json!({ "bio": "hello", "phone": "123" })).unwrap();
    assert_eq!(ok.bio.as_deref(), Some("hello"));
    assert!(ok.name.is_none());
}

#[test]
fn test_resolve_request_action_names() {
    let req: ResolveReportRequest =
        serde_json::from_value(json!({ "action": "deleteResource" })).unwrap();
    assert_eq!(req.action, ResolutionAction::DeleteResource);
    assert!(req.email.is_none());

    let req: ResolveReportRequest = serde_json::from_value(json!({
        "action": "warn",
        "email": "someone@iitgn.ac.in"
    }))
    .unwrap();
    assert_eq!(req.action, ResolutionAction::Warn);
    assert_eq!(req.email.as_deref(), Some("someone@iitgn.ac.in"));

    let edit = serde_json::to_value(ResolutionAction::EditResource).unwrap();
    assert_eq!(edit, "editResource");
}

// --- Enumerations ---

#[test]
fn test_role_parsing() {
    assert_eq!("viewer".parse::<Role>(), Ok(Role::Viewer));
    assert_eq!(" admin ".parse::<Role>(), Ok(Role::Admin));
    assert_eq!(
        "superuser".parse::<Role>(),
        Err(ValidationError::InvalidRole("superuser".to_string()))
    );
    assert_eq!(Role::default(), Role::Viewer);
    assert_eq!(Role::Contributor.to_string(), "contributor");
}

#[test]
fn test_role_reviewer_tiers() {
    assert!(!Role::Viewer.is_reviewer());
    assert!(Role::Contributor.is_reviewer());
    assert!(Role::Admin.is_reviewer());
}

#[test]
fn test_resource_type_kinds() {
    assert!(ResourceType::Pdf.is_file());
    assert!(ResourceType::Image.is_file());
    assert!(!ResourceType::Link.is_file());
    assert_eq!("image".parse::<ResourceType>(), Ok(ResourceType::Image));
    assert!(matches!(
        "video".parse::<ResourceType>(),
        Err(ValidationError::Malformed(_))
    ));
}
