use crate::{
    error::{AppError, AppResult},
    models::{
        AdminDashboardStats, Container, NewResource, Report, ResourceFilter, ResourceRecord,
        Role, SignInProfile, UpdateProfileRequest, UserProfile, UserRef,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, query_builder::QueryBuilder};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};
use uuid::Uuid;

/// Repository Trait
///
/// The document store contract. Partitions: `users`, `email_to_uid`,
/// `pending_resources`, `resources` (approved) and `reports`.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across
/// Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users / Role Store ---
    async fn get_user(&self, uid: &str) -> AppResult<Option<UserProfile>>;
    // Creates the profile as `viewer` on first sign-in, otherwise merges the
    // display fields. Also refreshes the email index.
    async fn upsert_user_on_sign_in(&self, seed: SignInProfile) -> AppResult<UserProfile>;
    async fn update_profile(
        &self,
        uid: &str,
        req: UpdateProfileRequest,
    ) -> AppResult<Option<UserProfile>>;
    async fn set_photo_url(&self, uid: &str, photo_url: &str) -> AppResult<Option<UserProfile>>;
    // Updates the cached role and stamps `role_updated_at`.
    async fn set_user_role(&self, uid: &str, role: Role) -> AppResult<Option<UserProfile>>;
    // Stamps `sessions_revoked_at`, invalidating every token issued so far.
    async fn revoke_sessions(&self, uid: &str) -> AppResult<Option<UserProfile>>;
    async fn find_uid_by_email(&self, email: &str) -> AppResult<Option<String>>;

    // --- Resources ---
    async fn create_resource(
        &self,
        container: Container,
        new: NewResource,
    ) -> AppResult<ResourceRecord>;
    async fn get_resource(&self, container: Container, id: Uuid)
    -> AppResult<Option<ResourceRecord>>;
    async fn list_resources(
        &self,
        container: Container,
        filter: &ResourceFilter,
    ) -> AppResult<Vec<ResourceRecord>>;
    // Both containers, newest first.
    async fn list_user_resources(&self, uid: &str) -> AppResult<Vec<ResourceRecord>>;
    // Replaces the editable fields in place. Returns None if the record is
    // no longer in `container`.
    async fn update_resource(
        &self,
        container: Container,
        record: &ResourceRecord,
    ) -> AppResult<Option<ResourceRecord>>;
    async fn delete_resource(&self, container: Container, id: Uuid) -> AppResult<bool>;
    /// Moves a pending record into the approved partition under the same id,
    /// atomically. Returns None if it is no longer pending (e.g. another
    /// reviewer won the race).
    async fn approve_pending(&self, id: Uuid) -> AppResult<Option<ResourceRecord>>;

    // --- Reports ---
    async fn create_report(
        &self,
        resource_id: Uuid,
        course_code: &str,
        reason: &str,
        reported_by: UserRef,
    ) -> AppResult<Report>;
    async fn get_report(&self, id: Uuid) -> AppResult<Option<Report>>;
    async fn list_reports(&self) -> AppResult<Vec<Report>>;
    async fn list_reports_for_resource(&self, resource_id: Uuid) -> AppResult<Vec<Report>>;
    async fn delete_reports_for_resource(&self, resource_id: Uuid) -> AppResult<u64>;

    async fn get_stats(&self) -> AppResult<AdminDashboardStats>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Row Types (Postgres) ---

const USER_COLUMNS: &str = "uid, name, email, photo_url, phone, batch, branch, bio, role, \
     created_at, role_updated_at, sessions_revoked_at";

const RESOURCE_COLUMNS: &str = "id, course_title, description, resource_type, course_code, year, \
     semester, branch, professor, urls, uploaded_by_uid, uploaded_by_name, uploaded_by_email, \
     approved, stamped_at";

const REPORT_COLUMNS: &str =
    "id, resource_id, course_code, reason, reported_by_uid, reported_by_name, reported_by_email, created_at";

#[derive(Debug, FromRow)]
struct UserRow {
    uid: String,
    name: String,
    email: String,
    photo_url: String,
    phone: String,
    batch: String,
    branch: String,
    bio: String,
    role: String,
    created_at: DateTime<Utc>,
    role_updated_at: Option<DateTime<Utc>>,
    sessions_revoked_at: Option<DateTime<Utc>>,
}

impl UserRow {
    fn into_profile(self) -> AppResult<UserProfile> {
        let role = self.role.parse::<Role>().map_err(|e| {
            AppError::Downstream(format!("corrupt role for user {}: {e}", self.uid))
        })?;
        Ok(UserProfile {
            uid: self.uid,
            name: self.name,
            email: self.email,
            photo_url: self.photo_url,
            phone: self.phone,
            batch: self.batch,
            branch: self.branch,
            bio: self.bio,
            role,
            created_at: self.created_at,
            role_updated_at: self.role_updated_at,
            sessions_revoked_at: self.sessions_revoked_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ResourceRow {
    id: Uuid,
    course_title: String,
    description: String,
    resource_type: String,
    course_code: String,
    year: String,
    semester: String,
    branch: String,
    professor: String,
    urls: Vec<String>,
    uploaded_by_uid: String,
    uploaded_by_name: String,
    uploaded_by_email: String,
    approved: bool,
    stamped_at: DateTime<Utc>,
}

impl ResourceRow {
    fn into_record(self) -> AppResult<ResourceRecord> {
        let resource_type = self.resource_type.parse().map_err(|e| {
            AppError::Downstream(format!("corrupt type for resource {}: {e}", self.id))
        })?;
        Ok(ResourceRecord {
            id: self.id,
            course_title: self.course_title,
            description: self.description,
            resource_type,
            course_code: self.course_code,
            year: self.year,
            semester: self.semester,
            branch: self.branch,
            professor: self.professor,
            urls: self.urls,
            uploaded_by: UserRef {
                uid: self.uploaded_by_uid,
                name: self.uploaded_by_name,
                email: self.uploaded_by_email,
            },
            approved: self.approved,
            timestamp: self.stamped_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReportRow {
    id: Uuid,
    resource_id: Uuid,
    course_code: String,
    reason: String,
    reported_by_uid: String,
    reported_by_name: String,
    reported_by_email: String,
    created_at: DateTime<Utc>,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        Report {
            id: row.id,
            resource_id: row.resource_id,
            course_code: row.course_code,
            reason: row.reason,
            reported_by: UserRef {
                uid: row.reported_by_uid,
                name: row.reported_by_name,
                email: row.reported_by_email,
            },
            timestamp: row.created_at,
        }
    }
}

fn into_records(rows: Vec<ResourceRow>) -> AppResult<Vec<ResourceRecord>> {
    rows.into_iter().map(ResourceRow::into_record).collect()
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, uid: &str) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE uid = $1"
        ))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRow::into_profile).transpose()
    }

    /// upsert_user_on_sign_in
    ///
    /// Runs the profile merge and the email index refresh in one transaction.
    /// Empty provider values never overwrite stored name or photo.
    async fn upsert_user_on_sign_in(&self, seed: SignInProfile) -> AppResult<UserProfile> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (uid, name, email, photo_url, role, created_at)
            VALUES ($1, $2, $3, $4, 'viewer', NOW())
            ON CONFLICT (uid) DO UPDATE SET
                name = CASE WHEN EXCLUDED.name <> '' THEN EXCLUDED.name ELSE users.name END,
                email = CASE WHEN EXCLUDED.email <> '' THEN EXCLUDED.email ELSE users.email END,
                photo_url = CASE WHEN EXCLUDED.photo_url <> '' THEN EXCLUDED.photo_url ELSE users.photo_url END
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&seed.uid)
        .bind(&seed.name)
        .bind(&seed.email)
        .bind(&seed.photo_url)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO email_to_uid (email, uid) VALUES ($1, $2) \
             ON CONFLICT (email) DO UPDATE SET uid = EXCLUDED.uid",
        )
        .bind(seed.email.to_lowercase())
        .bind(&seed.uid)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        row.into_profile()
    }

    /// update_profile
    ///
    /// Uses `COALESCE` so only the provided fields change.
    async fn update_profile(
        &self,
        uid: &str,
        req: UpdateProfileRequest,
    ) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                phone = COALESCE($3, phone),
                batch = COALESCE($4, batch),
                branch = COALESCE($5, branch),
                bio = COALESCE($6, bio)
            WHERE uid = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(uid)
        .bind(req.name)
        .bind(req.phone)
        .bind(req.batch)
        .bind(req.branch)
        .bind(req.bio)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRow::into_profile).transpose()
    }

    async fn set_photo_url(&self, uid: &str, photo_url: &str) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET photo_url = $2 WHERE uid = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(uid)
        .bind(photo_url)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRow::into_profile).transpose()
    }

    async fn set_user_role(&self, uid: &str, role: Role) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET role = $2, role_updated_at = NOW() WHERE uid = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(uid)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRow::into_profile).transpose()
    }

    async fn revoke_sessions(&self, uid: &str) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET sessions_revoked_at = NOW() WHERE uid = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRow::into_profile).transpose()
    }

    async fn find_uid_by_email(&self, email: &str) -> AppResult<Option<String>> {
        let uid = sqlx::query_scalar::<_, String>("SELECT uid FROM email_to_uid WHERE email = $1")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(uid)
    }

    /// create_resource
    ///
    /// The `approved` flag always mirrors the target container.
    async fn create_resource(
        &self,
        container: Container,
        new: NewResource,
    ) -> AppResult<ResourceRecord> {
        let row = sqlx::query_as::<_, ResourceRow>(&format!(
            r#"
            INSERT INTO {table} (
                id, course_title, description, resource_type, course_code, year, semester,
                branch, professor, urls, uploaded_by_uid, uploaded_by_name, uploaded_by_email,
                approved, stamped_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW())
            RETURNING {RESOURCE_COLUMNS}
            "#,
            table = container.table()
        ))
        .bind(Uuid::new_v4())
        .bind(new.course_title)
        .bind(new.description)
        .bind(new.resource_type.as_str())
        .bind(new.course_code)
        .bind(new.year)
        .bind(new.semester)
        .bind(new.branch)
        .bind(new.professor)
        .bind(new.urls)
        .bind(new.uploaded_by.uid)
        .bind(new.uploaded_by.name)
        .bind(new.uploaded_by.email)
        .bind(container == Container::Approved)
        .fetch_one(&self.pool)
        .await?;
        row.into_record()
    }

    async fn get_resource(
        &self,
        container: Container,
        id: Uuid,
    ) -> AppResult<Option<ResourceRecord>> {
        let row = sqlx::query_as::<_, ResourceRow>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM {} WHERE id = $1",
            container.table()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ResourceRow::into_record).transpose()
    }

    /// list_resources
    ///
    /// Builds the filter with `QueryBuilder` so every user value is a bind
    /// parameter. Search is a plain case-insensitive substring match.
    async fn list_resources(
        &self,
        container: Container,
        filter: &ResourceFilter,
    ) -> AppResult<Vec<ResourceRecord>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {RESOURCE_COLUMNS} FROM {} WHERE TRUE",
            container.table()
        ));

        if let Some(code) = non_empty(&filter.course_code) {
            builder.push(" AND LOWER(course_code) = LOWER(");
            builder.push_bind(code.to_string());
            builder.push(")");
        }
        if let Some(year) = non_empty(&filter.year) {
            builder.push(" AND year = ");
            builder.push_bind(year.to_string());
        }
        if let Some(branch) = non_empty(&filter.branch) {
            builder.push(" AND branch = ");
            builder.push_bind(branch.to_string());
        }
        if let Some(resource_type) = filter.resource_type {
            builder.push(" AND resource_type = ");
            builder.push_bind(resource_type.as_str());
        }
        if let Some(semester) = non_empty(&filter.semester) {
            builder.push(" AND semester = ");
            builder.push_bind(semester.to_string());
        }
        if let Some(search) = non_empty(&filter.search) {
            let pattern = format!("%{}%", search);
            builder.push(" AND (");
            let mut columns = builder.separated(" OR ");
            for column in [
                "course_code",
                "course_title",
                "description",
                "branch",
                "resource_type",
                "professor",
            ] {
                columns.push(format!("{column} ILIKE "));
                columns.push_bind_unseparated(pattern.clone());
            }
            builder.push(")");
        }

        builder.push(" ORDER BY stamped_at DESC");

        let rows = builder
            .build_query_as::<ResourceRow>()
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }

    async fn list_user_resources(&self, uid: &str) -> AppResult<Vec<ResourceRecord>> {
        let rows = sqlx::query_as::<_, ResourceRow>(&format!(
            r#"
            SELECT {RESOURCE_COLUMNS} FROM pending_resources WHERE uploaded_by_uid = $1
            UNION ALL
            SELECT {RESOURCE_COLUMNS} FROM resources WHERE uploaded_by_uid = $1
            ORDER BY stamped_at DESC
            "#
        ))
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }

    async fn update_resource(
        &self,
        container: Container,
        record: &ResourceRecord,
    ) -> AppResult<Option<ResourceRecord>> {
        let row = sqlx::query_as::<_, ResourceRow>(&format!(
            r#"
            UPDATE {table}
            SET course_title = $2,
                description = $3,
                resource_type = $4,
                course_code = $5,
                year = $6,
                semester = $7,
                branch = $8,
                professor = $9,
                urls = $10
            WHERE id = $1
            RETURNING {RESOURCE_COLUMNS}
            "#,
            table = container.table()
        ))
        .bind(record.id)
        .bind(&record.course_title)
        .bind(&record.description)
        .bind(record.resource_type.as_str())
        .bind(&record.course_code)
        .bind(&record.year)
        .bind(&record.semester)
        .bind(&record.branch)
        .bind(&record.professor)
        .bind(&record.urls)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ResourceRow::into_record).transpose()
    }

    async fn delete_resource(&self, container: Container, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", container.table()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// approve_pending
    ///
    /// `DELETE ... RETURNING` takes the row lock, so a concurrent approver
    /// blocks and then sees zero rows. Insert and delete commit together.
    async fn approve_pending(&self, id: Uuid) -> AppResult<Option<ResourceRecord>> {
        let mut tx = self.pool.begin().await?;

        let pending = sqlx::query_as::<_, ResourceRow>(&format!(
            "DELETE FROM pending_resources WHERE id = $1 RETURNING {RESOURCE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(pending) = pending else {
            tx.rollback().await?;
            return Ok(None);
        };

        let approved = sqlx::query_as::<_, ResourceRow>(&format!(
            r#"
            INSERT INTO resources (
                id, course_title, description, resource_type, course_code, year, semester,
                branch, professor, urls, uploaded_by_uid, uploaded_by_name, uploaded_by_email,
                approved, stamped_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, TRUE, NOW())
            RETURNING {RESOURCE_COLUMNS}
            "#
        ))
        .bind(pending.id)
        .bind(pending.course_title)
        .bind(pending.description)
        .bind(pending.resource_type)
        .bind(pending.course_code)
        .bind(pending.year)
        .bind(pending.semester)
        .bind(pending.branch)
        .bind(pending.professor)
        .bind(pending.urls)
        .bind(pending.uploaded_by_uid)
        .bind(pending.uploaded_by_name)
        .bind(pending.uploaded_by_email)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        approved.into_record().map(Some)
    }

    async fn create_report(
        &self,
        resource_id: Uuid,
        course_code: &str,
        reason: &str,
        reported_by: UserRef,
    ) -> AppResult<Report> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            INSERT INTO reports (
                id, resource_id, course_code, reason,
                reported_by_uid, reported_by_name, reported_by_email, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(resource_id)
        .bind(course_code)
        .bind(reason)
        .bind(reported_by.uid)
        .bind(reported_by.name)
        .bind(reported_by.email)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_report(&self, id: Uuid) -> AppResult<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Report::from))
    }

    async fn list_reports(&self) -> AppResult<Vec<Report>> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Report::from).collect())
    }

    async fn list_reports_for_resource(&self, resource_id: Uuid) -> AppResult<Vec<Report>> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE resource_id = $1 ORDER BY created_at DESC"
        ))
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Report::from).collect())
    }

    async fn delete_reports_for_resource(&self, resource_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM reports WHERE resource_id = $1")
            .bind(resource_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// get_stats
    ///
    /// Compiles the dashboard counters in a single round trip.
    async fn get_stats(&self) -> AppResult<AdminDashboardStats> {
        let (total_users, approved_resources, pending_resources, open_reports) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM resources),
                    (SELECT COUNT(*) FROM pending_resources),
                    (SELECT COUNT(*) FROM reports)
                "#,
            )
            .fetch_one(&self.pool)
            .await?;
        Ok(AdminDashboardStats {
            total_users,
            approved_resources,
            pending_resources,
            open_reports,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// --- In-Memory Implementation ---

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, UserProfile>,
    email_to_uid: HashMap<String, String>,
    pending: HashMap<Uuid, ResourceRecord>,
    approved: HashMap<Uuid, ResourceRecord>,
    reports: HashMap<Uuid, Report>,
}

impl MemoryState {
    fn container(&self, container: Container) -> &HashMap<Uuid, ResourceRecord> {
        match container {
            Container::Pending => &self.pending,
            Container::Approved => &self.approved,
        }
    }

    fn container_mut(&mut self, container: Container) -> &mut HashMap<Uuid, ResourceRecord> {
        match container {
            Container::Pending => &mut self.pending,
            Container::Approved => &mut self.approved,
        }
    }
}

/// InMemoryRepository
///
/// A `Repository` held entirely in process memory behind one mutex, so every
/// operation (including `approve_pending`) is atomic. Used by the test suite
/// and for running the API without a database.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
    /// When set, `delete_reports_for_resource` fails. Lets tests exercise the
    /// partial-failure path of report resolution.
    pub fail_report_deletes: AtomicBool,
    /// When set, `set_user_role` fails.
    pub fail_role_writes: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> AppResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Downstream("in-memory store lock poisoned".to_string()))
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn matches_filter(record: &ResourceRecord, filter: &ResourceFilter) -> bool {
    if let Some(code) = non_empty(&filter.course_code) {
        if !record.course_code.eq_ignore_ascii_case(code) {
            return false;
        }
    }
    if let Some(year) = non_empty(&filter.year) {
        if record.year != year {
            return false;
        }
    }
    if let Some(branch) = non_empty(&filter.branch) {
        if record.branch != branch {
            return false;
        }
    }
    if let Some(resource_type) = filter.resource_type {
        if record.resource_type != resource_type {
            return false;
        }
    }
    if let Some(semester) = non_empty(&filter.semester) {
        if record.semester != semester {
            return false;
        }
    }
    if let Some(search) = non_empty(&filter.search) {
        let needle = search.to_lowercase();
        let hit = [
            record.course_code.as_str(),
            record.course_title.as_str(),
            record.description.as_str(),
            record.branch.as_str(),
            record.resource_type.as_str(),
            record.professor.as_str(),
        ]
        .iter()
        .any(|field| contains_ci(field, &needle));
        if !hit {
            return false;
        }
    }
    true
}

fn newest_first(records: &mut [ResourceRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, uid: &str) -> AppResult<Option<UserProfile>> {
        Ok(self.state()?.users.get(uid).cloned())
    }

    async fn upsert_user_on_sign_in(&self, seed: SignInProfile) -> AppResult<UserProfile> {
        let mut state = self.state()?;
        let profile = state
            .users
            .entry(seed.uid.clone())
            .and_modify(|existing| {
                if !seed.name.is_empty() {
                    existing.name = seed.name.clone();
                }
                if !seed.email.is_empty() {
                    existing.email = seed.email.clone();
                }
                if !seed.photo_url.is_empty() {
                    existing.photo_url = seed.photo_url.clone();
                }
            })
            .or_insert_with(|| UserProfile {
                uid: seed.uid.clone(),
                name: seed.name.clone(),
                email: seed.email.clone(),
                photo_url: seed.photo_url.clone(),
                role: Role::Viewer,
                created_at: Utc::now(),
                ..UserProfile::default()
            })
            .clone();
        state
            .email_to_uid
            .insert(seed.email.to_lowercase(), seed.uid);
        Ok(profile)
    }

    async fn update_profile(
        &self,
        uid: &str,
        req: UpdateProfileRequest,
    ) -> AppResult<Option<UserProfile>> {
        let mut state = self.state()?;
        Ok(state.users.get_mut(uid).map(|profile| {
            if let Some(name) = req.name {
                profile.name = name;
            }
            if let Some(phone) = req.phone {
                profile.phone = phone;
            }
            if let Some(batch) = req.batch {
                profile.batch = batch;
            }
            if let Some(branch) = req.branch {
                profile.branch = branch;
            }
            if let Some(bio) = req.bio {
                profile.bio = bio;
            }
            profile.clone()
        }))
    }

    async fn set_photo_url(&self, uid: &str, photo_url: &str) -> AppResult<Option<UserProfile>> {
        let mut state = self.state()?;
        Ok(state.users.get_mut(uid).map(|profile| {
            profile.photo_url = photo_url.to_string();
            profile.clone()
        }))
    }

    async fn set_user_role(&self, uid: &str, role: Role) -> AppResult<Option<UserProfile>> {
        if self.fail_role_writes.load(Ordering::SeqCst) {
            return Err(AppError::Downstream("simulated role write failure".to_string()));
        }
        let mut state = self.state()?;
        Ok(state.users.get_mut(uid).map(|profile| {
            profile.role = role;
            profile.role_updated_at = Some(Utc::now());
            profile.clone()
        }))
    }

    async fn revoke_sessions(&self, uid: &str) -> AppResult<Option<UserProfile>> {
        let mut state = self.state()?;
        Ok(state.users.get_mut(uid).map(|profile| {
            profile.sessions_revoked_at = Some(Utc::now());
            profile.clone()
        }))
    }

    async fn find_uid_by_email(&self, email: &str) -> AppResult<Option<String>> {
        Ok(self
            .state()?
            .email_to_uid
            .get(&email.trim().to_lowercase())
            .cloned())
    }

    async fn create_resource(
        &self,
        container: Container,
        new: NewResource,
    ) -> AppResult<ResourceRecord> {
        let record = ResourceRecord {
            id: Uuid::new_v4(),
            course_title: new.course_title,
            description: new.description,
            resource_type: new.resource_type,
            course_code: new.course_code,
            year: new.year,
            semester: new.semester,
            branch: new.branch,
            professor: new.professor,
            urls: new.urls,
            uploaded_by: new.uploaded_by,
            approved: container == Container::Approved,
            timestamp: Utc::now(),
        };
        self.state()?
            .container_mut(container)
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_resource(
        &self,
        container: Container,
        id: Uuid,
    ) -> AppResult<Option<ResourceRecord>> {
        Ok(self.state()?.container(container).get(&id).cloned())
    }

    async fn list_resources(
        &self,
        container: Container,
        filter: &ResourceFilter,
    ) -> AppResult<Vec<ResourceRecord>> {
        let mut records: Vec<ResourceRecord> = self
            .state()?
            .container(container)
            .values()
            .filter(|record| matches_filter(record, filter))
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn list_user_resources(&self, uid: &str) -> AppResult<Vec<ResourceRecord>> {
        let state = self.state()?;
        let mut records: Vec<ResourceRecord> = state
            .pending
            .values()
            .chain(state.approved.values())
            .filter(|record| record.uploaded_by.uid == uid)
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn update_resource(
        &self,
        container: Container,
        record: &ResourceRecord,
    ) -> AppResult<Option<ResourceRecord>> {
        let mut state = self.state()?;
        Ok(state
            .container_mut(container)
            .get_mut(&record.id)
            .map(|stored| {
                stored.course_title = record.course_title.clone();
                stored.description = record.description.clone();
                stored.resource_type = record.resource_type;
                stored.course_code = record.course_code.clone();
                stored.year = record.year.clone();
                stored.semester = record.semester.clone();
                stored.branch = record.branch.clone();
                stored.professor = record.professor.clone();
                stored.urls = record.urls.clone();
                stored.clone()
            }))
    }

    async fn delete_resource(&self, container: Container, id: Uuid) -> AppResult<bool> {
        Ok(self.state()?.container_mut(container).remove(&id).is_some())
    }

    async fn approve_pending(&self, id: Uuid) -> AppResult<Option<ResourceRecord>> {
        let mut state = self.state()?;
        let Some(mut record) = state.pending.remove(&id) else {
            return Ok(None);
        };
        record.approved = true;
        record.timestamp = Utc::now();
        state.approved.insert(record.id, record.clone());
        Ok(Some(record))
    }

    async fn create_report(
        &self,
        resource_id: Uuid,
        course_code: &str,
        reason: &str,
        reported_by: UserRef,
    ) -> AppResult<Report> {
        let report = Report {
            id: Uuid::new_v4(),
            resource_id,
            course_code: course_code.to_string(),
            reason: reason.to_string(),
            reported_by,
            timestamp: Utc::now(),
        };
        self.state()?.reports.insert(report.id, report.clone());
        Ok(report)
    }

    async fn get_report(&self, id: Uuid) -> AppResult<Option<Report>> {
        Ok(self.state()?.reports.get(&id).cloned())
    }

    async fn list_reports(&self) -> AppResult<Vec<Report>> {
        let mut reports: Vec<Report> = self.state()?.reports.values().cloned().collect();
        reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(reports)
    }

    async fn list_reports_for_resource(&self, resource_id: Uuid) -> AppResult<Vec<Report>> {
        let mut reports: Vec<Report> = self
            .state()?
            .reports
            .values()
            .filter(|report| report.resource_id == resource_id)
            .cloned()
            .collect();
        reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(reports)
    }

    async fn delete_reports_for_resource(&self, resource_id: Uuid) -> AppResult<u64> {
        if self.fail_report_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Downstream(
                "simulated report deletion failure".to_string(),
            ));
        }
        let mut state = self.state()?;
        let before = state.reports.len();
        state
            .reports
            .retain(|_, report| report.resource_id != resource_id);
        Ok((before - state.reports.len()) as u64)
    }

    async fn get_stats(&self) -> AppResult<AdminDashboardStats> {
        let state = self.state()?;
        Ok(AdminDashboardStats {
            total_users: state.users.len() as i64,
            approved_resources: state.approved.len() as i64,
            pending_resources: state.pending.len() as i64,
            open_reports: state.reports.len() as i64,
        })
    }
}
