//! HttpBackend against a local axum server

mod helpers;

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use helpers::{comment_json, target, test_config};
use lcf_common::events::{EventBus, FeedEvent, RenderInstruction, TransportMode};
use lcf_core::connection::{parse_stream_message, StreamMessage};
use lcf_core::error::Error;
use lcf_core::pagination::FetchWindow;
use lcf_core::sources::{CommentSource, CustomerSource, OrderSource};
use lcf_core::{FeedController, HttpBackend, Sources, StaticCredential};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "secret";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == format!("Bearer {}", TOKEN))
}

async fn stream_handler(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let events = vec![
        Ok::<_, Infallible>(Event::default().comment("hello")),
        Ok(Event::default().data(json!([comment_json("c1", "An", "one")]).to_string())),
        Ok(Event::default().data("[]")),
        Ok(Event::default().data(
            json!({
                "data": [comment_json("c2", "Binh", "two"), comment_json("c3", "Chi", "three")],
                "totalCount": 3
            })
            .to_string(),
        )),
    ];
    Sse::new(futures::stream::iter(events)).into_response()
}

async fn page_handler(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    let offset = params.get("offset").cloned().unwrap_or_default();
    let limit = params.get("limit").cloned().unwrap_or_default();
    Json(json!({
        "data": [comment_json(&format!("o{}-l{}", offset, limit), "An", "hi")],
        "totalCount": 120
    }))
    .into_response()
}

async fn orders_handler(Query(params): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    let forced = params.get("force").map_or(false, |v| v == "true");
    let code = if forced { "fresh" } else { "cached" };
    Json(json!([{
        "Facebook_CommentId": "c1",
        "SessionIndex": 4,
        "Telephone": "0912345678",
        "Code": code,
        "PrintCount": 1
    }]))
}

async fn customer_handler(Path(phone): Path<String>) -> Response {
    match phone.as_str() {
        "0912345678" => Json(json!({
            "Id": 9,
            "Name": "Lan",
            "Phone": "0912345678",
            "StatusText": "VIP"
        }))
        .into_response(),
        "0000000000" => Json(serde_json::Value::Null).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/api/comments/stream", get(stream_handler))
        .route("/api/comments", get(page_handler))
        .route("/api/orders", get(orders_handler))
        .route("/api/customers/:phone", get(customer_handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn backend(base_url: &str) -> HttpBackend {
    HttpBackend::new(base_url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_stream_yields_event_payloads() {
    let base_url = spawn_server().await;
    let backend = backend(&base_url);

    let messages: Vec<String> = backend
        .open_stream(&target(), TOKEN)
        .await
        .unwrap()
        .filter_map(|m| async move { m.ok() })
        .collect()
        .await;
    assert_eq!(messages.len(), 3);

    let parsed: Vec<StreamMessage> = messages.iter().map(|m| parse_stream_message(m)).collect();
    assert!(matches!(&parsed[0], StreamMessage::Batch(b) if b.comments[0].id == "c1"));
    assert!(matches!(parsed[1], StreamMessage::Empty));
    assert!(matches!(&parsed[2], StreamMessage::Batch(b) if b.total_count == Some(3)));
}

#[tokio::test]
async fn test_stream_rejects_bad_token() {
    let base_url = spawn_server().await;
    let result = backend(&base_url).open_stream(&target(), "wrong").await;
    assert!(matches!(result, Err(Error::UpstreamStatus { status: 401, .. })));
}

#[tokio::test]
async fn test_fetch_page_sends_window() {
    let base_url = spawn_server().await;
    let window = FetchWindow {
        page: 3,
        limit: 50,
        offset: 100,
    };

    let page = backend(&base_url)
        .fetch_page(&target(), window, TOKEN)
        .await
        .unwrap();
    assert_eq!(page.total_count, Some(120));
    assert_eq!(page.data[0].id, "o100-l50");

    let err = backend(&base_url)
        .fetch_page(&target(), window, "wrong")
        .await
        .unwrap_err();
    match err {
        Error::UpstreamStatus { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad token");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_orders_and_force_refresh() {
    let base_url = spawn_server().await;
    let backend = backend(&base_url);

    let cached = backend.fetch_orders("post-1", false, TOKEN).await.unwrap();
    assert_eq!(cached[0].code.as_deref(), Some("cached"));
    assert_eq!(cached[0].session_index, Some(4));

    let fresh = backend.fetch_orders("post-1", true, TOKEN).await.unwrap();
    assert_eq!(fresh[0].code.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_customer_lookup_outcomes() {
    let base_url = spawn_server().await;
    let backend = backend(&base_url);

    let known = backend.fetch_customer("0912345678", TOKEN).await.unwrap().unwrap();
    assert_eq!(known.label(), "VIP");
    assert_eq!(known.id, Some(9));

    assert!(backend.fetch_customer("0000000000", TOKEN).await.unwrap().is_none());
    assert!(backend.fetch_customer("0999999999", TOKEN).await.unwrap().is_none());
}

#[tokio::test]
async fn test_controller_over_http() {
    let base_url = spawn_server().await;
    let sources = Sources::from_backend(
        Arc::new(backend(&base_url)),
        Arc::new(StaticCredential::new(Some(TOKEN.to_string()))),
    );
    let controller = FeedController::new(test_config(), sources, EventBus::new(1000));
    let mut rx = controller.subscribe();

    controller.start(target(), TransportMode::Stream).await.unwrap();

    let first = helpers::wait_for(&mut rx, |e| match e {
        FeedEvent::Render { instruction: RenderInstruction::ReplaceAll { items }, .. } => {
            Some(items.clone())
        }
        _ => None,
    })
    .await;
    assert_eq!(first[0].comment.id, "c1");

    let status = helpers::wait_for(&mut rx, |e| match e {
        FeedEvent::CustomerStatusUpdated { phone, status, .. } => Some((phone.clone(), status.label().to_string())),
        _ => None,
    })
    .await;
    assert_eq!(status, ("0912345678".to_string(), "VIP".to_string()));

    controller.stop().await;
}
