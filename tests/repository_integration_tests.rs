//! Runs against a live Postgres. `DATABASE_URL` must be set; run with
//! `cargo test -- --ignored`.

use semstore::{
    models::{
        Container, NewResource, ResourceFilter, ResourceType, Role, SignInProfile,
        UpdateProfileRequest, UserRef,
    },
    repository::{PostgresRepository, Repository},
};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// A uid unique to this run, so tests can share one database.
fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

fn uploader(uid: &str) -> UserRef {
    UserRef {
        uid: uid.to_string(),
        name: "Test Uploader".to_string(),
        email: format!("{uid}@iitgn.ac.in"),
    }
}

fn new_resource(uid: &str, course_code: &str) -> NewResource {
    NewResource {
        course_title: "Probability".to_string(),
        resource_type: ResourceType::Pdf,
        course_code: course_code.to_string(),
        year: "2024".to_string(),
        semester: "Odd".to_string(),
        branch: "CSE".to_string(),
        urls: vec![
            "https://media.test/first.pdf".to_string(),
            "https://media.test/second.pdf".to_string(),
        ],
        uploaded_by: uploader(uid),
        ..Default::default()
    }
}

// --- Users ---

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_sign_in_upsert_and_email_index() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let uid = unique("user");
    let email = format!("{uid}@IITGN.ac.in");

    let created = repo
        .upsert_user_on_sign_in(SignInProfile {
            uid: uid.clone(),
            name: "First".to_string(),
            email: email.clone(),
            photo_url: "https://photos.test/p.png".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(created.role, Role::Viewer);
    assert!(created.role_updated_at.is_none());

    // Second sign-in without a photo keeps the stored one.
    let merged = repo
        .upsert_user_on_sign_in(SignInProfile {
            uid: uid.clone(),
            name: "Renamed".to_string(),
            email: email.clone(),
            photo_url: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(merged.name, "Renamed");
    assert_eq!(merged.photo_url, "https://photos.test/p.png");
    assert_eq!(merged.created_at, created.created_at);

    let found = repo.find_uid_by_email(&email.to_lowercase()).await.unwrap();
    assert_eq!(found.as_deref(), Some(uid.as_str()));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_profile_update_and_role_stamp() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let uid = unique("user");
    repo.upsert_user_on_sign_in(SignInProfile {
        uid: uid.clone(),
        name: "Dev".to_string(),
        email: format!("{uid}@iitgn.ac.in"),
        photo_url: String::new(),
    })
    .await
    .unwrap();

    let updated = repo
        .update_profile(
            &uid,
            UpdateProfileRequest {
                batch: Some("2026".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.batch, "2026");
    assert_eq!(updated.name, "Dev");

    let promoted = repo
        .set_user_role(&uid, Role::Contributor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(promoted.role, Role::Contributor);
    assert!(promoted.role_updated_at.is_some());

    assert!(
        repo.set_user_role(&unique("missing"), Role::Admin)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_revoke_sessions_stamps_profile() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let uid = unique("leaver");
    repo.upsert_user_on_sign_in(SignInProfile {
        uid: uid.clone(),
        name: "Leaver".to_string(),
        email: format!("{uid}@iitgn.ac.in"),
        photo_url: String::new(),
    })
    .await
    .unwrap();

    let revoked = repo.revoke_sessions(&uid).await.unwrap().unwrap();
    assert!(revoked.sessions_revoked_at.is_some());
    assert_eq!(
        repo.get_user(&uid).await.unwrap().unwrap().sessions_revoked_at,
        revoked.sessions_revoked_at
    );

    assert!(repo.revoke_sessions(&unique("missing")).await.unwrap().is_none());
}

// --- Resources ---

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_approve_moves_record_under_same_id() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let uid = unique("user");
    let code = unique("PG");

    let pending = repo
        .create_resource(Container::Pending, new_resource(&uid, &code))
        .await
        .unwrap();
    assert!(!pending.approved);
    assert_eq!(pending.urls, new_resource(&uid, &code).urls);

    let approved = repo.approve_pending(pending.id).await.unwrap().unwrap();
    assert_eq!(approved.id, pending.id);
    assert!(approved.approved);
    assert_eq!(approved.urls, pending.urls);

    assert!(
        repo.get_resource(Container::Pending, pending.id)
            .await
            .unwrap()
            .is_none()
    );
    // The loser of an approval race sees nothing to move.
    assert!(repo.approve_pending(pending.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_listing_filters_and_search() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let uid = unique("user");
    let code = unique("FLT");

    let mut link = new_resource(&uid, &code);
    link.resource_type = ResourceType::Link;
    link.professor = "Prof. Ramanujan".to_string();
    link.urls = vec!["https://example.com/notes".to_string()];
    repo.create_resource(Container::Approved, link).await.unwrap();
    repo.create_resource(Container::Approved, new_resource(&uid, &code))
        .await
        .unwrap();

    let by_code = repo
        .list_resources(
            Container::Approved,
            &ResourceFilter {
                course_code: Some(code.to_lowercase()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(by_code.len(), 2);
    // Newest first.
    assert!(by_code[0].timestamp >= by_code[1].timestamp);

    let links = repo
        .list_resources(
            Container::Approved,
            &ResourceFilter {
                course_code: Some(code.clone()),
                resource_type: Some(ResourceType::Link),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(links.len(), 1);

    let searched = repo
        .list_resources(
            Container::Approved,
            &ResourceFilter {
                course_code: Some(code.clone()),
                search: Some("ramanujan".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(searched.len(), 1);
    assert_eq!(searched[0].resource_type, ResourceType::Link);

    let mine = repo.list_user_resources(&uid).await.unwrap();
    assert_eq!(mine.len(), 2);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_update_and_delete_resource() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let uid = unique("user");

    let mut record = repo
        .create_resource(Container::Approved, new_resource(&uid, &unique("UPD")))
        .await
        .unwrap();
    record.course_title = "Probability II".to_string();
    record.urls.push("https://media.test/third.pdf".to_string());

    let saved = repo
        .update_resource(Container::Approved, &record)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.course_title, "Probability II");
    assert_eq!(saved.urls.len(), 3);
    assert_eq!(saved.uploaded_by, record.uploaded_by);

    // Wrong container: nothing to update.
    assert!(
        repo.update_resource(Container::Pending, &record)
            .await
            .unwrap()
            .is_none()
    );

    assert!(repo.delete_resource(Container::Approved, record.id).await.unwrap());
    assert!(!repo.delete_resource(Container::Approved, record.id).await.unwrap());
}

// --- Reports ---

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_reports_keyed_by_id_and_indexed_by_resource() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let uid = unique("user");
    let code = unique("REP");

    let record = repo
        .create_resource(Container::Approved, new_resource(&uid, &code))
        .await
        .unwrap();

    let first = repo
        .create_report(record.id, &code, "Wrong course", uploader(&unique("r1")))
        .await
        .unwrap();
    let second = repo
        .create_report(record.id, &code, "Blurry scan", uploader(&unique("r2")))
        .await
        .unwrap();
    assert_ne!(first.id, second.id);

    let fetched = repo.get_report(first.id).await.unwrap().unwrap();
    assert_eq!(fetched.reason, "Wrong course");
    assert_eq!(fetched.resource_id, record.id);

    let for_resource = repo.list_reports_for_resource(record.id).await.unwrap();
    assert_eq!(for_resource.len(), 2);

    let removed = repo.delete_reports_for_resource(record.id).await.unwrap();
    assert_eq!(removed, 2);
    assert!(repo.get_report(second.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_stats_are_non_negative_counts() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let uid = unique("user");

    repo.create_resource(Container::Pending, new_resource(&uid, &unique("STA")))
        .await
        .unwrap();

    let stats = repo.get_stats().await.unwrap();
    assert!(stats.pending_resources >= 1);
    assert!(stats.total_users >= 0);
    assert!(stats.open_reports >= 0);
}
