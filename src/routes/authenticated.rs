use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Everything a signed-in user can reach. The `AuthUser` middleware layered
/// on this router rejects bad or stale sessions before a handler runs; role
/// and ownership checks happen in the services through the access policy.
pub fn authenticated_routes(upload_limit: usize) -> Router<AppState> {
    Router::<AppState>::new()
        // --- Profile ---
        .route("/me", get(handlers::get_me).put(handlers::update_me))
        .route(
            "/me/photo",
            post(handlers::upload_photo).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // GET /me/resources
        // The caller's uploads in both containers.
        .route("/me/resources", get(handlers::get_my_resources))
        // --- Resources ---
        // GET lists the approved repository (filters + search); POST submits (multipart).
        .route(
            "/resources",
            get(handlers::list_resources)
                .post(handlers::create_resource)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        // GET /resources/pending
        // Review queue for contributors and admins.
        .route("/resources/pending", get(handlers::list_pending))
        .route(
            "/resources/{id}",
            get(handlers::get_resource)
                .patch(handlers::update_resource)
                .delete(handlers::delete_resource)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        // --- Moderation ---
        .route("/resources/{id}/approve", post(handlers::approve_resource))
        .route("/resources/{id}/reject", post(handlers::reject_resource))
        .route("/resources/{id}/report", post(handlers::report_resource))
}
