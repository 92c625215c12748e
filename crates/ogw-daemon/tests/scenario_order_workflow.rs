//! End-to-end create-order scenarios through the full HTTP surface.
//!
//! Each test logs in over the router, then drives `/api/create/order` with
//! the minted token, and finally inspects the shared in-memory store to
//! assert on workflow side effects (order state, payments).

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use ogw_daemon::{routes, state};
use ogw_schemas::OrderState;
use ogw_store::EntityStore;
use ogw_testkit::{MemStore, TEST_DB, TEST_LOGIN, TEST_PASSWORD};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    mem: Arc<MemStore>,
    state: Arc<state::AppState>,
}

impl Harness {
    fn new() -> Self {
        let mem = Arc::new(MemStore::seeded());
        let store: Arc<dyn EntityStore> = Arc::clone(&mem) as Arc<dyn EntityStore>;
        let state = Arc::new(state::AppState::new(store, None));
        Self { mem, state }
    }

    fn router(&self) -> axum::Router {
        routes::build_router(Arc::clone(&self.state))
    }

    async fn login(&self) -> String {
        let req = Request::builder()
            .method("GET")
            .uri(format!(
                "/api/login?db={TEST_DB}&login={TEST_LOGIN}&password={TEST_PASSWORD}"
            ))
            .body(axum::body::Body::empty())
            .unwrap();
        let (status, body) = call(self.router(), req).await;
        assert_eq!(status, StatusCode::OK, "login must succeed in harness");
        parse_json(body)["access_token"]
            .as_str()
            .expect("login profile carries a token")
            .to_string()
    }

    async fn post_order(&self, token: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/api/create/order")
            .header("access_token", token)
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = call(self.router(), req).await;
        (status, parse_json(bytes))
    }
}

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

const HAPPY_PATH_BODY: &str = r#"{
    "partner_id": {"uuid": "partner-001", "name": "Alice"},
    "order_line": [{
        "product_id": {
            "uuid": "sku1",
            "komoditas": "Rice",
            "area_provinsi": "Jakarta",
            "area_kota": "Jakarta Selatan"
        },
        "qty": 2,
        "price_unit": 10,
        "price": 10
    }]
}"#;

// ---------------------------------------------------------------------------
// Happy path: one call walks the order all the way to paid
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_order_runs_to_paid_and_reports_totals() {
    let h = Harness::new();
    let token = h.login().await;

    let (status, json) = h.post_order(&token, HAPPY_PATH_BODY).await;
    assert_eq!(status, StatusCode::OK, "unexpected failure: {json}");

    let order_id = json["order_id"].as_i64().expect("order_id in response");
    assert!(order_id > 0);
    assert_eq!(json["total"], 20.0);
    assert_eq!(json["lines"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["lines"][0]["uuid"], "sku1");
    assert_eq!(json["lines"][0]["qty"], 2.0);
    assert_eq!(json["lines"][0]["price"], 10.0);
    assert_eq!(json["lines"][0]["subtotal"], 20.0);

    // The workflow must have walked the order to its terminal state and
    // settled the invoice through the seeded bank journal.
    let order = h.mem.order(order_id).await.unwrap();
    assert_eq!(order.state, OrderState::Paid);
    assert_eq!(order.amount_total, 20.0);

    let payments = h.mem.payments();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, 20.0);
    assert_eq!(payments[0].method, "bank");

    let invoices = h.mem.invoices_for_order(order_id).await.unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].amount_residual, 0.0);
}

#[tokio::test]
async fn repeated_orders_reuse_resolved_entities() {
    let h = Harness::new();
    let token = h.login().await;

    let (first, _) = h.post_order(&token, HAPPY_PATH_BODY).await;
    let (second, _) = h.post_order(&token, HAPPY_PATH_BODY).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);

    // Same partner uuid, product uuid, and city: resolution must find, not
    // duplicate.
    assert_eq!(h.mem.partner_count(), 1);
    assert_eq!(h.mem.product_count(), 1);
    assert_eq!(h.mem.city_count(), 1);
    assert_eq!(h.mem.payment_count(), 2);
}

// ---------------------------------------------------------------------------
// Token invalidation: a new login retires the previous token
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_login_invalidates_first_token() {
    let h = Harness::new();
    let first = h.login().await;
    let second = h.login().await;
    assert_ne!(first, second);

    let (status, json) = h.post_order(&first, HAPPY_PATH_BODY).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["title"], "access_token");

    let (status, _) = h.post_order(&second, HAPPY_PATH_BODY).await;
    assert_eq!(status, StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Request validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_body_is_rejected_with_400() {
    let h = Harness::new();
    let token = h.login().await;

    let (status, json) = h.post_order(&token, "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["title"], "bad request");
    assert_eq!(json["http_status"], 400);
}

#[tokio::test]
async fn unknown_top_level_field_is_rejected_with_400() {
    let h = Harness::new();
    let token = h.login().await;

    let body = r#"{"partner_id": {"uuid": "p1"}, "order_line": [], "surprise": true}"#;
    let (status, json) = h.post_order(&token, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["title"], "bad request");
}

#[tokio::test]
async fn missing_partner_is_invalid_partner() {
    let h = Harness::new();
    let token = h.login().await;

    let (status, json) = h.post_order(&token, r#"{"partner_id": null}"#).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["title"], "invalid partner");
}

#[tokio::test]
async fn unknown_state_name_is_invalid_area() {
    let h = Harness::new();
    let token = h.login().await;

    let body = r#"{
        "partner_id": {"uuid": "p1", "name": "Alice"},
        "order_line": [{
            "product_id": {"uuid": "skuX", "komoditas": "Salt", "area_provinsi": "Atlantis"},
            "qty": 1,
            "price_unit": 5
        }]
    }"#;
    let (status, json) = h.post_order(&token, body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["title"], "invalid area");

    // Resolution failed before any order was written.
    assert_eq!(h.mem.product_count(), 0);
    assert_eq!(h.mem.payment_count(), 0);
}

#[tokio::test]
async fn line_without_product_payload_is_invalid_product() {
    let h = Harness::new();
    let token = h.login().await;

    let body = r#"{
        "partner_id": {"uuid": "p1", "name": "Alice"},
        "order_line": [{"product_id": null, "qty": 1, "price_unit": 5}]
    }"#;
    let (status, json) = h.post_order(&token, body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["title"], "invalid product");
}
