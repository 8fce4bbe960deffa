// ============================================================================
// End-to-End Tests
// ============================================================================
//
// Every request goes through the gateway; events flow through the outbox
// and the shared in-memory exchange to the media and search consumers.
//
// ============================================================================

use pulse_tests::{spawn_platform, user_from};
use serde_json::json;

#[tokio::test]
async fn test_post_lifecycle_reaches_every_service() {
    let platform = spawn_platform().await.unwrap();
    let alice = platform.register("alice").await.unwrap();

    let (status, uploaded) = platform.upload(&alice, "photo.png", b"png-bytes").await.unwrap();
    assert_eq!(status, 201, "{}", uploaded);
    let media_id = uploaded["mediaId"].as_str().unwrap().to_string();
    assert_eq!(platform.media.len(), 1);
    assert_eq!(platform.objects.len(), 1);

    let post_id = platform
        .create_post(&alice, "hello", &[media_id.clone()])
        .await
        .unwrap();
    platform.settle().await.unwrap();

    let hits = platform.search_ids(&alice, "hello").await.unwrap();
    assert_eq!(hits, vec![post_id.clone()]);

    let (status, body) = platform
        .get(&format!("/v1/posts/{}", post_id), &alice.access_token)
        .await
        .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["data"]["userId"], alice.user_id);
    assert_eq!(body["data"]["mediaIds"], json!([media_id]));

    let (status, body) = platform
        .delete(&format!("/v1/posts/{}", post_id), &alice.access_token)
        .await
        .unwrap();
    assert_eq!(status, 200, "{}", body);
    platform.settle().await.unwrap();

    assert!(platform.search_ids(&alice, "hello").await.unwrap().is_empty());
    assert!(platform.media.is_empty());
    assert!(platform.objects.is_empty());
    assert!(platform.bus.dead_letters().is_empty());

    let routing_keys: Vec<String> = platform
        .bus
        .published()
        .into_iter()
        .map(|event| event.routing_key)
        .collect();
    assert_eq!(routing_keys, vec!["post.created", "post.deleted"]);
}

#[tokio::test]
async fn test_only_the_owner_can_delete() {
    let platform = spawn_platform().await.unwrap();
    let alice = platform.register("alice").await.unwrap();
    let mallory = platform.register("mallory").await.unwrap();

    let post_id = platform.create_post(&alice, "mine", &[]).await.unwrap();

    let (status, body) = platform
        .delete(&format!("/v1/posts/{}", post_id), &mallory.access_token)
        .await
        .unwrap();
    assert_eq!(status, 404);
    assert_eq!(body["message"], "Post not found");

    let (status, _) = platform
        .get(&format!("/v1/posts/{}", post_id), &mallory.access_token)
        .await
        .unwrap();
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_refresh_token_rotation_and_logout() {
    let platform = spawn_platform().await.unwrap();
    let alice = platform.register("alice").await.unwrap();

    let (status, body) = platform
        .post_json(
            "/v1/auth/refresh-token",
            None,
            json!({"refreshToken": alice.refresh_token}),
        )
        .await
        .unwrap();
    assert_eq!(status, 200, "{}", body);
    let rotated = body["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(rotated, alice.refresh_token);

    let (status, body) = platform
        .post_json(
            "/v1/auth/refresh-token",
            None,
            json!({"refreshToken": alice.refresh_token}),
        )
        .await
        .unwrap();
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Invalid or expired refresh token");

    let (status, _) = platform
        .post_json("/v1/auth/logout", None, json!({"refreshToken": rotated}))
        .await
        .unwrap();
    assert_eq!(status, 200);

    let (status, _) = platform
        .post_json("/v1/auth/refresh-token", None, json!({"refreshToken": rotated}))
        .await
        .unwrap();
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_gateway_boundary() {
    let platform = spawn_platform().await.unwrap();

    let (status, body) = platform
        .post_json("/v1/posts/create-post", None, json!({"content": "anonymous"}))
        .await
        .unwrap();
    assert_eq!(status, 401);
    assert_eq!(body["success"], false);

    let (status, _) = platform.get("/v1/posts/all-posts", "garbage").await.unwrap();
    assert_eq!(status, 403);

    let (status, _) = platform.get("/v1/unknown", "garbage").await.unwrap();
    assert_eq!(status, 404);

    let (status, body) = platform
        .post_json(
            "/v1/auth/login",
            None,
            json!({"email": "nobody@example.com", "password": "whatever"}),
        )
        .await
        .unwrap();
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Invalid credentials");
    assert!(user_from(&body).is_err());
}
