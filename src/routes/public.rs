use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without the session middleware: the health probe and
/// the session resource. Sign-in only needs a verified provider token because
/// the profile may not exist yet; sign-out extracts `AuthUser` itself.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers and monitoring.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/session: domain check, profile merge, fresh role claim.
        // DELETE /auth/session: revokes the provider sessions.
        .route(
            "/auth/session",
            post(handlers::sign_in).delete(handlers::sign_out),
        )
}
