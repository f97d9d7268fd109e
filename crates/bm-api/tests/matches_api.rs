use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{Router, body::Body, http::Request, http::StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

use bm_api::auth::{AuthConfig, Claims};
use bm_api::{AppConfig, SharedState};
use bm_common::analysis::{AnalysisError, BookAnalysis, BookAnalyzer, DisabledAnalyzer};
use bm_common::matching::MatchingEngine;
use bm_common::store::{MemoryStore, ProfileStore};
use bm_common::{ActivityLog, SkillVector, UserProfile};

const KEY: &str = "test-key";

struct FixedAnalyzer;

#[async_trait]
impl BookAnalyzer for FixedAnalyzer {
    async fn analyze(
        &self,
        book_title: &str,
        _author: Option<&str>,
    ) -> Result<BookAnalysis, AnalysisError> {
        Ok(BookAnalysis {
            author: Some("author".into()),
            summary: Some(format!("{book_title}の要約です。")),
            tags: vec!["戦略".into()],
            points: SkillVector {
                os_strategy: 10,
                skill_marketing: 10,
                ..SkillVector::default()
            },
        })
    }
}

fn profile(id: &str) -> UserProfile {
    UserProfile {
        id: id.into(),
        display_name: Some(format!("name-{id}")),
        is_visible: true,
        ..UserProfile::default()
    }
}

fn tagged(id: &str, owner: &str, tags: &[&str]) -> ActivityLog {
    ActivityLog {
        id: id.into(),
        user_id: owner.into(),
        book_title: format!("book {id}"),
        tags: Some(tags.iter().map(|t| t.to_string()).collect()),
        ..ActivityLog::default()
    }
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for id in ["me", "a", "b"] {
        store.insert_profile(profile(id));
    }
    store.push_log(tagged("l1", "me", &["strategy", "finance"]));
    store.push_log(tagged("l2", "a", &["strategy"]));
    store.push_log(tagged("l3", "b", &["finance", "strategy"]));
    store
}

fn state(store: Arc<MemoryStore>, auth: AuthConfig, analyzer: Arc<dyn BookAnalyzer>) -> SharedState {
    bm_api::state_with(
        store,
        analyzer,
        AppConfig::for_tests(auth),
        MatchingEngine::default(),
    )
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-api-key", KEY)
        .body(Body::empty())
        .unwrap()
}

fn bearer(secret: &str, sub: &str) -> String {
    let token = encode(
        &Header::new(Algorithm::HS256),
        &Claims {
            sub: sub.into(),
            exp: 4_102_444_800,
        },
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap();
    format!("Bearer {token}")
}

#[tokio::test]
async fn matches_are_ordered_by_shared_tags() {
    let app = bm_api::create_router(state(
        seeded_store(),
        AuthConfig::api_key(KEY),
        Arc::new(DisabledAnalyzer),
    ));

    let (status, body) = send(&app, get("/api/users/me/matches")).await;

    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], "b");
    assert_eq!(list[0]["common_tags"], json!(["finance", "strategy"]));
    assert_eq!(list[1]["id"], "a");
    assert_eq!(list[0]["skill_diff"], 1000);
    assert_eq!(list[0]["os_diff"], 1000);
    assert_eq!(list[0]["similarity_percent"], 10);
    assert_eq!(list[0]["display_name"], "name-b");
}

#[tokio::test]
async fn store_outage_is_reported_as_retryable() {
    let store = seeded_store();
    store.set_unavailable(true);
    let app = bm_api::create_router(state(store, AuthConfig::api_key(KEY), Arc::new(DisabledAnalyzer)));

    let (status, body) = send(&app, get("/api/users/me/matches")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "service_unavailable");
}

#[tokio::test]
async fn missing_api_key_is_unauthorized() {
    let app = bm_api::create_router(bm_api::test_state(KEY));

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/api/users/me/matches")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn jwt_subject_must_match_path_user() {
    let app = bm_api::create_router(state(
        seeded_store(),
        AuthConfig::jwt("secret"),
        Arc::new(DisabledAnalyzer),
    ));

    let request = |sub: &str| {
        Request::builder()
            .uri("/api/users/me/matches")
            .header("authorization", bearer("secret", sub))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send(&app, request("a")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, request("me")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn top_tags_counts_logs() {
    let store = seeded_store();
    store.push_log(tagged("l4", "me", &["finance"]));
    let app = bm_api::create_router(state(store, AuthConfig::api_key(KEY), Arc::new(DisabledAnalyzer)));

    let (status, body) = send(&app, get("/api/users/me/tags?limit=1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tags"], json!([{ "tag": "finance", "count": 2 }]));
}

#[tokio::test]
async fn submitted_books_are_analysed_and_can_be_deleted() {
    let store = seeded_store();
    let state = state(store.clone(), AuthConfig::api_key(KEY), Arc::new(FixedAnalyzer));
    let app = bm_api::create_router(state.clone());

    let (status, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/users/me/books")
            .header("x-api-key", KEY)
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "books": [{ "title": "ストーリーとしての競争戦略", "author": "楠木建" }] })
                    .to_string(),
            ))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["batch_id"].as_str().map(str::len), Some(26));

    tokio::time::timeout(Duration::from_secs(5), state.queue.counter().wait_idle())
        .await
        .unwrap();

    let saved = store
        .logs()
        .into_iter()
        .find(|log| log.book_title == "ストーリーとしての競争戦略")
        .unwrap();
    assert_eq!(saved.user_id, "me");
    assert_eq!(
        store.get_skill_vector("me").await.unwrap().map(|s| s.os_strategy),
        Some(10)
    );

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/users/me/books/{}", saved.id))
            .header("x-api-key", KEY)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        store.get_skill_vector("me").await.unwrap(),
        Some(SkillVector::default())
    );
}

#[tokio::test]
async fn empty_submission_is_rejected() {
    let app = bm_api::create_router(bm_api::test_state(KEY));

    let (status, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/users/me/books")
            .header("x-api-key", KEY)
            .header("content-type", "application/json")
            .body(Body::from(r#"{"books":[]}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn deleting_another_users_book_is_forbidden() {
    let app = bm_api::create_router(state(
        seeded_store(),
        AuthConfig::api_key(KEY),
        Arc::new(DisabledAnalyzer),
    ));

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/api/users/me/books/l2")
            .header("x-api-key", KEY)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}
