use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use pulse_error::AppResult;
use pulse_server_shared::TrustedUser;
use serde::Deserialize;
use serde_json::json;

use crate::core;
use crate::SearchContext;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

/// GET /api/search/posts?query=
pub async fn search_posts(
    State(context): State<SearchContext>,
    _user: TrustedUser,
    Query(params): Query<SearchQuery>,
) -> AppResult<impl IntoResponse> {
    let results = core::search_posts(&context, params.query.as_deref()).await?;
    Ok(Json(json!({ "success": true, "results": results })))
}
