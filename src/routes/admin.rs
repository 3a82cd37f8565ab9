use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// Role administration and the report queue. Nested under `/admin`; every
/// handler extracts `AuthUser` and refuses anyone without the `admin` claim.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /admin/set-role
        // Sets the provider role claim and the cached profile role.
        .route("/set-role", post(handlers::set_role))
        // GET /admin/users?email=
        // Profile lookup through the email index.
        .route("/users", get(handlers::find_user))
        // GET /admin/reports
        .route("/reports", get(handlers::list_reports))
        // POST /admin/reports/{id}/resolve
        // deleteResource | warn | editResource
        .route("/reports/{id}/resolve", post(handlers::resolve_report))
        // GET /admin/stats
        .route("/stats", get(handlers::get_admin_stats))
}
