//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use sqlx::PgPool;
use storyloop_core::env::{Clock, RandomIds};
use storyloop_gameplay::application::EngineSettings;
use storyloop_store::pg_game_store::PgGameStore;
use storyloop_test_support::{FixedClock, RecordingDispatcher};
use tower::ServiceExt;
use uuid::Uuid;

use storyloop_api::extract::PLAYER_ID_HEADER;
use storyloop_api::routes;
use storyloop_api::state::AppState;

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Build the full app router with a real `PgGameStore` and a dispatcher that
/// only records tasks. Uses the same route structure as `main.rs`.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with_dispatcher(pool, Arc::new(RecordingDispatcher::new()))
}

/// Build the full app router around `dispatcher`, for tests that inspect the
/// generation tasks handed to the worker.
pub fn build_test_app_with_dispatcher(pool: PgPool, dispatcher: Arc<RecordingDispatcher>) -> Router {
    let app_state = AppState::new(
        fixed_clock(),
        Arc::new(RandomIds),
        Arc::new(PgGameStore::new(pool)),
        dispatcher,
        EngineSettings::default(),
    );

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::game::router())
        .nest("/api/v1/players", routes::player::router())
        .nest("/internal/v1/generation", routes::internal::router())
        .with_state(app_state)
}

/// Insert a ready story with a single `tension` stat bounded by 0..=10.
pub async fn seed_story(pool: &PgPool) -> Uuid {
    let story_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO published_stories (id, author_id, status, config, setup, language)
         VALUES ($1, $2, 'ready', $3, $4, 'en')",
    )
    .bind(story_id)
    .bind(Uuid::new_v4())
    .bind(json!({"premise": "A lighthouse keeper hears knocking."}))
    .bind(json!({
        "stats": {"tension": {"initial": 4, "min": 0, "max": 10}},
        "characters": [{"name": "Mara"}]
    }))
    .execute(pool)
    .await
    .unwrap();
    story_id
}

/// Send a request and return the status with the JSON body (`Null` if empty).
pub async fn send(
    app: Router,
    method: &str,
    uri: &str,
    player: Option<Uuid>,
    body: Option<&serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(player) = player {
        builder = builder.header(PLAYER_ID_HEADER, player.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body as `player` and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    player: Uuid,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(player), Some(body)).await
}

/// Send a GET request as `player` and return the response.
pub async fn get_json(app: Router, uri: &str, player: Uuid) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, Some(player), None).await
}

/// Deliver worker content for `state_hash` through the internal callback.
pub async fn deliver_scene(
    app: Router,
    story_id: Uuid,
    state_hash: &str,
    content: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let body = json!({"story_id": story_id, "state_hash": state_hash, "content": content});
    send(app, "POST", "/internal/v1/generation/scene-ready", None, Some(&body)).await
}
