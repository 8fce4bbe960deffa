// ============================================================================
// Pulse Server Shared
// ============================================================================
//
// Plumbing used by the gateway and every backend service:
// - access-token signing/verification (auth)
// - gateway-to-service identity propagation (extractors, internal_token)
// - tracing setup (telemetry) and the /metrics endpoint (metrics)
// - graceful serving and health endpoints (server)
//
// ============================================================================

pub mod auth;
pub mod extractors;
pub mod internal_token;
pub mod metrics;
pub mod server;
pub mod telemetry;
pub mod utils;

pub use auth::{Claims, IssuedToken, TokenManager};
pub use extractors::{ApiJson, InternalAuth, TrustedUser};
pub use internal_token::InternalTokenSigner;

/// Header carrying the verified caller id from the gateway to backends
pub const USER_ID_HEADER: &str = "x-user-id";
/// Optional signature over `x-user-id` (see `internal_token`)
pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
