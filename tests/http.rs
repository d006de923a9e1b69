use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use chrono::{Duration, TimeZone, Utc};
use library_catalog::{
    AppState, Config, LibraryService, build_rate_limiter, build_router,
    clock::{Clock, ManualClock},
    store::MemoryStore,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const DUNE: &str = "9780441013593";
const GATSBY: &str = "9780743273565";

fn test_config() -> Config {
    Config {
        rate_limit_per_minute: 1000,
        ..Config::default()
    }
}

fn app_with(config: Config) -> (Router, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
    ));
    let library = LibraryService::new(Arc::new(MemoryStore::new()), clock.clone() as Arc<dyn Clock>)
        .with_late_fees_enabled(config.late_fees_enabled);
    let state = Arc::new(AppState {
        library,
        rate_limiter: build_rate_limiter(config.rate_limit_per_minute),
        config,
    });
    (build_router(state), clock)
}

fn app() -> (Router, Arc<ManualClock>) {
    app_with(test_config())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            req = req.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn list_books_from(app: &Router, peer: &str, forwarded_for: &str) -> StatusCode {
    let req = Request::builder()
        .uri("/api/v1/books")
        .header("x-forwarded-for", forwarded_for)
        .extension(ConnectInfo(peer.parse::<SocketAddr>().unwrap()))
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(req).await.unwrap().status()
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn add_book(app: &Router, isbn: &str, title: &str, copies: i32) {
    let (status, _) = send_json(
        app,
        "POST",
        "/api/v1/books",
        Some(json!({"isbn": isbn, "title": title, "author": "Someone", "total_copies": copies})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn health_check_behavior() {
    let res = library_catalog::handlers::health_check().await;
    assert_eq!(res, "OK");

    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn catalog_page_shows_empty_state() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/catalog", None).await;
    let html = String::from_utf8(body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("No books in catalog"));
    assert!(!html.contains("<table>"));
}

#[tokio::test]
async fn catalog_page_offers_borrowing_only_for_available_books() {
    let (app, _) = app();
    add_book(&app, DUNE, "Dune", 2).await;
    add_book(&app, GATSBY, "Gatsby & <Co>", 1).await;
    let (status, _) = send_json(
        &app,
        "POST",
        "/api/v1/loans",
        Some(json!({"patron_id": "123456", "isbn": GATSBY})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, "GET", "/catalog", None).await;
    let html = String::from_utf8(body).unwrap();

    assert!(html.contains("2/2 Available"));
    assert!(html.contains("Not Available"));
    assert!(html.contains("Gatsby &amp; &lt;Co&gt;"));
    assert_eq!(html.matches("<form").count(), 1);
    assert!(html.contains(&format!("value=\"{DUNE}\"")));
}

#[tokio::test]
async fn add_book_reports_offending_field() {
    let (app, _) = app();
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/books",
        Some(json!({"isbn": "12345", "title": "Dune", "author": "Frank Herbert", "total_copies": 1})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "isbn");
    assert_eq!(body["error"], "ISBN must be exactly 13 digits.");
}

#[tokio::test]
async fn borrow_and_return_status_codes() {
    let (app, clock) = app();
    add_book(&app, DUNE, "Dune", 1).await;
    let loan = |patron: &str, isbn: &str| Some(json!({"patron_id": patron, "isbn": isbn}));

    let (status, body) = send_json(&app, "POST", "/api/v1/loans", loan("123456", DUNE)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["isbn"], DUNE);

    let (status, _) = send_json(&app, "POST", "/api/v1/loans", loan("654321", DUNE)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send_json(&app, "POST", "/api/v1/loans", loan("654321", GATSBY)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = send_json(&app, "POST", "/api/v1/loans", loan("65432", DUNE)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "patron_id");

    let (status, _) = send_json(&app, "POST", "/api/v1/returns", loan("654321", DUNE)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    clock.advance(Duration::days(17));
    let (status, body) = send_json(&app, "POST", "/api/v1/returns", loan("123456", DUNE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["days_overdue"], 3);
    assert_eq!(body["fee_amount"], 1.5);

    let (status, _) = send_json(&app, "POST", "/api/v1/returns", loan("123456", DUNE)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn late_fee_endpoint_returns_fee_json() {
    let (app, clock) = app();
    add_book(&app, DUNE, "Dune", 1).await;
    send_json(
        &app,
        "POST",
        "/api/v1/loans",
        Some(json!({"patron_id": "123456", "isbn": DUNE})),
    )
    .await;
    clock.advance(Duration::days(24));

    let (status, body) = send_json(&app, "GET", &format!("/api/v1/late-fees/123456/{DUNE}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"fee_amount": 6.5, "days_overdue": 10}));

    let (status, body) = send_json(&app, "GET", &format!("/api/v1/late-fees/111111/{DUNE}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"fee_amount": 0.0, "days_overdue": 0}));
}

#[tokio::test]
async fn late_fee_endpoint_reports_not_implemented_when_disabled() {
    let (app, _) = app_with(Config {
        late_fees_enabled: false,
        ..test_config()
    });
    let (status, _) = send_json(&app, "GET", &format!("/api/v1/late-fees/123456/{DUNE}"), None).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn search_endpoint_filters_by_type() {
    let (app, _) = app();
    add_book(&app, DUNE, "Dune", 1).await;
    add_book(&app, GATSBY, "The Great Gatsby", 1).await;

    let (status, body) = send_json(&app, "GET", "/api/v1/search?q=great&type=title", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["isbn"], GATSBY);

    let (_, body) = send_json(&app, "GET", "/api/v1/search?q=dune", None).await;
    assert_eq!(body[0]["isbn"], DUNE);

    let (_, body) = send_json(&app, "GET", "/api/v1/search?q=dune&type=genre", None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn patron_status_endpoint_has_stable_keys() {
    let (app, _) = app();
    let (status, body) = send_json(&app, "GET", "/api/v1/patrons/123456/status", None).await;

    assert_eq!(status, StatusCode::OK);
    for key in ["current_loans", "current_count", "total_late_fees", "history"] {
        assert!(body.get(key).is_some(), "missing {key}");
    }

    let (status, _) = send_json(&app, "GET", "/api/v1/patrons/12/status", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payments_without_gateway_are_not_implemented() {
    let (app, clock) = app();
    add_book(&app, DUNE, "Dune", 1).await;
    let loan = json!({"patron_id": "123456", "isbn": DUNE});
    send_json(&app, "POST", "/api/v1/loans", Some(loan.clone())).await;
    clock.advance(Duration::days(20));

    let (status, _) = send_json(&app, "POST", "/api/v1/late-fees/payments", Some(loan)).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/late-fees/refunds",
        Some(json!({"transaction_id": "txn_1", "amount": 20.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "amount");

    for (amount, error) in [
        (15.004, "Refund amount exceeds maximum late fee."),
        (0.004, "Refund amount must be in whole cents."),
    ] {
        let (status, body) = send_json(
            &app,
            "POST",
            "/api/v1/late-fees/refunds",
            Some(json!({"transaction_id": "txn_1", "amount": amount})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], error);
    }
}

#[tokio::test]
async fn rate_limiter_rejects_requests_over_quota() {
    let (app, _) = app_with(Config {
        rate_limit_per_minute: 2,
        ..Config::default()
    });

    for _ in 0..2 {
        let (status, _) = send(&app, "GET", "/api/v1/books", None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(&app, "GET", "/api/v1/books", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rate_limiter_ignores_forwarded_for_from_direct_clients() {
    let (app, _) = app_with(Config {
        rate_limit_per_minute: 2,
        ..Config::default()
    });
    let peer = "203.0.113.7:52000";

    assert_eq!(list_books_from(&app, peer, "198.51.100.1").await, StatusCode::OK);
    assert_eq!(list_books_from(&app, peer, "198.51.100.2").await, StatusCode::OK);
    assert_eq!(
        list_books_from(&app, peer, "198.51.100.3").await,
        StatusCode::TOO_MANY_REQUESTS
    );

    assert_eq!(
        list_books_from(&app, "203.0.113.8:52000", "198.51.100.3").await,
        StatusCode::OK
    );
}

#[tokio::test]
async fn rate_limiter_keys_on_forwarded_client_behind_trusted_proxy() {
    let (app, _) = app_with(Config {
        rate_limit_per_minute: 1,
        trusted_proxies: vec!["10.0.0.2".parse().unwrap()],
        ..Config::default()
    });
    let proxy = "10.0.0.2:41000";

    assert_eq!(list_books_from(&app, proxy, "198.51.100.1").await, StatusCode::OK);
    assert_eq!(list_books_from(&app, proxy, "198.51.100.2").await, StatusCode::OK);
    assert_eq!(
        list_books_from(&app, proxy, "198.51.100.1").await,
        StatusCode::TOO_MANY_REQUESTS
    );
}
