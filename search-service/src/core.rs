use pulse_error::{AppError, AppResult};

use crate::store::SearchHit;
use crate::SearchContext;

/// Results per query; there is no pagination
pub const MAX_RESULTS: i64 = 10;

pub async fn search_posts(context: &SearchContext, query: Option<&str>) -> AppResult<Vec<SearchHit>> {
    let query = query.map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(AppError::validation("\"query\" is required"));
    }

    let hits = context.store.search(query, MAX_RESULTS).await?;
    tracing::debug!(results = hits.len(), "Search completed");
    Ok(hits)
}
