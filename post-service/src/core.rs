use pulse_error::{AppError, AppResult};
use pulse_server_shared::utils::log_user_id;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::cache::{invalidate_post, listing_key, post_key};
use crate::store::Post;
use crate::PostContext;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub success: bool,
    pub posts: Vec<Post>,
    pub current_page: u64,
    pub total_pages: u64,
    pub total_posts: u64,
}

/// Positive integer query parameter; anything else falls back to `default`
pub fn parse_positive(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(default)
}

pub fn total_pages(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(limit)
}

fn parse_post_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::not_found("Post"))
}

pub fn parse_media_ids(raw: Option<Vec<String>>) -> AppResult<Vec<Uuid>> {
    raw.unwrap_or_default()
        .iter()
        .map(|id| {
            Uuid::parse_str(id.trim())
                .map_err(|_| AppError::validation("\"mediaIds\" must contain valid ids"))
        })
        .collect()
}

/// Read a cached JSON body; cache trouble degrades to a miss
async fn cached_body(context: &PostContext, key: &str) -> Option<Value> {
    match context.cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Discarding unreadable cache entry");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, key = %key, "Cache read failed, using database");
            None
        }
    }
}

async fn store_body(context: &PostContext, key: &str, body: &Value, ttl_secs: u64) {
    if let Err(e) = context.cache.set(key, &body.to_string(), ttl_secs).await {
        tracing::warn!(error = %e, key = %key, "Cache write failed");
    }
}

pub async fn create_post(
    context: &PostContext,
    user_id: Uuid,
    content: Option<String>,
    media_ids: Vec<Uuid>,
) -> AppResult<Post> {
    let content = content.unwrap_or_default();
    if content.trim().is_empty() {
        return Err(AppError::validation("\"content\" is required"));
    }

    let post = Post::new(user_id, content, media_ids);
    context.store.create_with_outbox(&post).await?;
    context.outbox_notify.notify_one();

    invalidate_post(context.cache.as_ref(), &post.id).await;

    tracing::info!(
        post_id = %post.id,
        user = %log_user_id(&context.logging, &user_id),
        "Post created"
    );
    Ok(post)
}

/// Listing page body, served from cache when present
pub async fn list_posts(context: &PostContext, page: u64, limit: u64) -> AppResult<Value> {
    let key = listing_key(page, limit);
    if let Some(body) = cached_body(context, &key).await {
        return Ok(body);
    }

    let offset = i64::try_from(page.saturating_sub(1).saturating_mul(limit)).unwrap_or(i64::MAX);
    let sql_limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let posts = context.store.list(offset, sql_limit).await?;
    let total = context.store.count().await?.max(0) as u64;

    let body = serde_json::to_value(PostPage {
        success: true,
        posts,
        current_page: page,
        total_pages: total_pages(total, limit),
        total_posts: total,
    })?;

    store_body(context, &key, &body, context.cache_config.listing_ttl_secs).await;
    Ok(body)
}

/// Single post body, served from cache when present
pub async fn get_post(context: &PostContext, raw_id: &str) -> AppResult<Value> {
    let post_id = parse_post_id(raw_id)?;

    let key = post_key(&post_id);
    if let Some(body) = cached_body(context, &key).await {
        return Ok(body);
    }

    let post = context
        .store
        .get(post_id)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))?;

    let body = json!({ "success": true, "data": post });
    store_body(context, &key, &body, context.cache_config.post_ttl_secs).await;
    Ok(body)
}

/// Delete a post owned by `user_id`. Other users' posts are reported as
/// not found.
pub async fn delete_post(context: &PostContext, user_id: Uuid, raw_id: &str) -> AppResult<()> {
    let post_id = parse_post_id(raw_id)?;

    let Some(post) = context
        .store
        .delete_owned_with_outbox(post_id, user_id)
        .await?
    else {
        return Err(AppError::not_found("Post"));
    };
    context.outbox_notify.notify_one();

    invalidate_post(context.cache.as_ref(), &post.id).await;

    tracing::info!(
        post_id = %post.id,
        user = %log_user_id(&context.logging, &user_id),
        media_count = post.media_ids.len(),
        "Post deleted"
    );
    Ok(())
}
