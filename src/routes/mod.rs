/// Router Module Index
///
/// Routes are split by access level, and each level gets its guard as a
/// router layer so no endpoint is exposed by accident.

/// Routes without the session middleware (health check, session).
pub mod public;

/// Routes behind the `AuthUser` session middleware.
pub mod authenticated;

/// Routes under `/admin`. Handlers check for the `admin` role claim.
pub mod admin;
