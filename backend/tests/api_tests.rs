//! HTTP API tests for the stage ledger endpoints
//!
//! Drives the full router (auth middleware included) over an in-memory store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use copper_ledger_backend::{
    create_app, middleware::Claims, store::MemoryStore, AppState, Config,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let config = Config::default();
    create_app(AppState::new(Arc::new(MemoryStore::new()), config))
}

fn token(sub: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    encode(
        &Header::default(),
        &Claims {
            sub: sub.to_string(),
            exp: now + 3600,
            iat: now,
        },
        &EncodingKey::from_secret(Config::default().jwt.secret.as_bytes()),
    )
    .unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token("operator-1")));
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_inventory_requires_token() {
    let app = app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/inventory")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_inventory_rejects_bad_token() {
    let app = app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/inventory")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_public_routes() {
    let app = app();
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/api/v1/stages").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let stages = body["data"].as_array().unwrap();
    assert_eq!(stages.len(), 6);
    assert_eq!(stages[0]["stage"], "purchase");
    assert_eq!(stages[5]["next"], Value::Null);
}

#[tokio::test]
async fn test_add_remove_return_flow() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/add",
        Some(json!({
            "stage": "kacha",
            "ownerId": "ownerA",
            "itemRef": "copper",
            "quantity": "100",
            "amount": "1000"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let record_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/remove",
        Some(json!({
            "stage": "kacha",
            "ownerId": "ownerA",
            "itemRef": "copper",
            "quantity": "30"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["quantity"], "70");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/return",
        Some(json!({
            "sourceStage": "kacha",
            "sourceOwnerId": "ownerA",
            "sourceItemRef": "copper",
            "destOwnerId": "ownerB",
            "newItemName": "wire",
            "quantity": "40"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["source"]["quantity"], "30");
    assert_eq!(body["data"]["destination"]["quantity"], "40");
    assert_eq!(body["data"]["destination"]["stage"], "draw");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/inventory/{}/history", record_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["action"], "created");
    assert_eq!(entries[2]["action"], "returned");
    assert_eq!(entries[2]["actionBy"], "operator-1");

    let (status, body) = send(&app, Method::GET, "/api/v1/inventory?stage=draw", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/inventory/lookup?stage=draw&ownerId=ownerB&itemRef=wire",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["quantity"], "40");
}

#[tokio::test]
async fn test_error_envelopes() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/add",
        Some(json!({
            "stage": "kacha",
            "ownerId": "ownerA",
            "itemRef": "copper",
            "quantity": "0"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["field"], "quantity");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/remove",
        Some(json!({
            "stage": "kacha",
            "ownerId": "ownerA",
            "itemRef": "copper",
            "quantity": "1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    send(
        &app,
        Method::POST,
        "/api/v1/inventory/add",
        Some(json!({
            "stage": "kacha",
            "ownerId": "ownerA",
            "itemRef": "copper",
            "quantity": "50",
            "amount": "500"
        })),
    )
    .await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/remove",
        Some(json!({
            "stage": "kacha",
            "ownerId": "ownerA",
            "itemRef": "copper",
            "quantity": "60"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_QUANTITY");
    assert_eq!(body["error"]["details"]["available"], "50");
}

#[tokio::test]
async fn test_delete_inventory_item_endpoint() {
    let app = app();
    let (_, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/add",
        Some(json!({
            "stage": "purchase",
            "ownerId": "supplier",
            "itemRef": "rod",
            "quantity": "12.5",
            "amount": "0"
        })),
    )
    .await;
    let record_id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/inventory/{}", record_id);

    let (status, body) = send(
        &app,
        Method::DELETE,
        &uri,
        Some(json!({ "quantity": "12.5" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], true);
    assert_eq!(body["data"]["record"]["status"], "cancelled");

    let (status, _) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::GET, &format!("{}/history", uri), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_history_csv_export() {
    let app = app();
    let (_, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/add",
        Some(json!({
            "stage": "pvc_purchase",
            "ownerId": "vendor",
            "itemRef": "pvc-compound",
            "quantity": "8",
            "amount": "640"
        })),
    )
    .await;
    let record_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/inventory/{}/history?format=csv", record_id))
                .header(header::AUTHORIZATION, format!("Bearer {}", token("operator-1")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/csv"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.lines().next().unwrap().starts_with("id,recordId,action"));
}
