// ============================================================================
// Gateway Routing
// ============================================================================
//
// Routing rules (public `/v1` prefix rewritten to the backends' `/api`):
// - /v1/auth/*   → identity-service (public)
// - /v1/posts/*  → post-service
// - /v1/media/*  → media-service
// - /v1/search/* → search-service
// - anything else → 404
//
// ============================================================================

use pulse_config::ServicesConfig;

const PUBLIC_PREFIX: &str = "/v1";
const UPSTREAM_PREFIX: &str = "/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Identity,
    Post,
    Media,
    Search,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Identity,
        Backend::Post,
        Backend::Media,
        Backend::Search,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Identity => "identity-service",
            Backend::Post => "post-service",
            Backend::Media => "media-service",
            Backend::Search => "search-service",
        }
    }

    /// Everything except the auth endpoints needs a bearer token
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Backend::Identity)
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "auth" => Some(Backend::Identity),
            "posts" => Some(Backend::Post),
            "media" => Some(Backend::Media),
            "search" => Some(Backend::Search),
            _ => None,
        }
    }
}

/// Where a public path is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub backend: Backend,
    pub upstream_path: String,
}

pub fn resolve(path: &str) -> Option<Route> {
    let rest = path.strip_prefix(PUBLIC_PREFIX)?;
    let segment = rest.strip_prefix('/')?.split('/').next()?;
    let backend = Backend::from_segment(segment)?;

    Some(Route {
        backend,
        upstream_path: format!("{}{}", UPSTREAM_PREFIX, rest),
    })
}

/// Base URL of every backend
#[derive(Debug, Clone)]
pub struct Upstreams {
    identity: String,
    post: String,
    media: String,
    search: String,
}

impl Upstreams {
    pub fn from_config(config: &ServicesConfig) -> Self {
        let normalize = |url: &str| url.trim_end_matches('/').to_string();
        Self {
            identity: normalize(&config.identity_service_url),
            post: normalize(&config.post_service_url),
            media: normalize(&config.media_service_url),
            search: normalize(&config.search_service_url),
        }
    }

    pub fn url(&self, backend: Backend) -> &str {
        match backend {
            Backend::Identity => &self.identity,
            Backend::Post => &self.post,
            Backend::Media => &self.media,
            Backend::Search => &self.search,
        }
    }
}
