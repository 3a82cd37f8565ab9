use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Ambient: configuration and the error taxonomy.
pub mod config;
pub mod error;

// Domain: records, the access policy and the services built on them.
pub mod models;
pub mod moderation;
pub mod policy;
pub mod reports;
pub mod roles;

// Collaborators behind traits.
pub mod identity;
pub mod media;
pub mod notify;
pub mod repository;
pub mod storage;

// HTTP surface.
pub mod auth;
pub mod handlers;
pub mod routes;

use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use identity::IdentityState;
pub use media::MediaState;
pub use notify::NotifierState;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every `#[utoipa::path]` handler, served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::sign_in, handlers::sign_out, handlers::get_me, handlers::update_me,
        handlers::upload_photo, handlers::get_my_resources, handlers::list_resources,
        handlers::list_pending, handlers::create_resource, handlers::get_resource,
        handlers::update_resource, handlers::delete_resource, handlers::approve_resource,
        handlers::reject_resource, handlers::report_resource,
        handlers::set_role, handlers::find_user, handlers::list_reports,
        handlers::resolve_report, handlers::get_admin_stats
    ),
    components(
        schemas(
            models::Role, models::ResourceType, models::Container, models::UserRef,
            models::UserProfile, models::ResourceRecord, models::Report,
            models::SubmitResourceRequest, models::UpdateResourceRequest,
            models::UpdateProfileRequest, models::CreateReportRequest,
            models::ResolutionAction, models::ResolveReportRequest, models::ReportResolution,
            models::SetRoleRequest, models::SetRoleResponse, models::Identity,
            models::AdminDashboardStats,
        )
    ),
    tags(
        (name = "semstore", description = "Moderated academic resource sharing API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared, immutable state. Every collaborator sits behind an
/// `Arc<dyn Trait>` so tests can swap in in-memory versions.
#[derive(Clone)]
pub struct AppState {
    /// Document store (profiles, resources, reports).
    pub repo: RepositoryState,
    /// Blob store (profile photos).
    pub storage: StorageState,
    /// Third-party media endpoint for resource files.
    pub media: MediaState,
    /// Authentication provider admin API.
    pub identity: IdentityState,
    pub notifier: NotifierState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Runs the `AuthUser` extractor ahead of every authenticated route, so a bad
/// session is rejected before the handler is reached.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the public, authenticated and admin routers, applies the
/// observability layers and registers the state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let upload_limit = state.config.max_upload_bytes;
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes(upload_limit)
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        // Admin handlers extract `AuthUser` themselves and check the role.
        .nest("/admin", admin::admin_routes())
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer`: method, URI and the `x-request-id` so every log
/// line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
