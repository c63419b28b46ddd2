mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{Duration, Utc};
use common::{response_json, TestApp, WEBHOOK_SECRET};
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;
use storefront_api::entities::order;
use storefront_api::gateway::webhook::{sign, SIGNATURE_HEADER};
use uuid::Uuid;

fn signed_webhook(payload: &serde_json::Value, secret: &str, timestamp: i64) -> Request<Body> {
    let body = serde_json::to_vec(payload).unwrap();
    let ts = timestamp.to_string();
    let signature = sign(&ts, &body, secret).unwrap();
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/payments/webhook")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, format!("t={},v1={}", ts, signature))
        .body(Body::from(body))
        .unwrap()
}

fn completed_event(session_id: &str) -> serde_json::Value {
    json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id } }
    })
}

async fn paid_session(app: &TestApp, user: Uuid) -> String {
    let lamp = app.seed_product("Lamp", 1500).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/session",
            Some(json!({ "items": [{ "productId": lamp, "quantity": 1 }] })),
            Some(user),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    app.gateway.mark_paid(&session_id);
    session_id
}

#[tokio::test]
async fn status_reports_service_metadata() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api/v1/status", None, None, &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["service"], "storefront-api");
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn health_pings_the_database() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api/v1/health", None, None, &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["checks"]["database"], "healthy");
}

#[tokio::test]
async fn caller_identity_is_required() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/session",
            Some(json!({ "items": [] })),
            None,
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Request::builder()
                .uri("/api/v1/coupons")
                .header("x-user-id", "not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Unauthorized");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn analytics_requires_admin_role() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/analytics", None, Some(Uuid::new_v4()), &[])
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::GET,
            "/api/v1/analytics",
            None,
            Some(Uuid::new_v4()),
            &["support", "admin"],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["dailySales"].as_array().map(Vec::len), Some(7));
}

#[tokio::test]
async fn analytics_window_is_bounded() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::GET,
            "/api/v1/analytics?days=0",
            None,
            Some(Uuid::new_v4()),
            &["admin"],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn coupon_endpoints_only_see_the_callers_coupons() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();
    app.coupons()
        .create_with_code("WELCOME15", owner, 15, Utc::now() + Duration::days(5))
        .await
        .unwrap();

    let response = app
        .request(Method::GET, "/api/v1/coupons", None, Some(other), &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert!(body["data"].is_null());

    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "WELCOME15" })),
            Some(owner),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["code"], "WELCOME15");
    assert_eq!(body["data"]["discountPercent"], 15);

    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "WELCOME15" })),
            Some(other),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn signed_webhook_confirms_the_session_once() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let session_id = paid_session(&app, user).await;

    let now = Utc::now().timestamp();
    for _ in 0..2 {
        let response = app
            .send(signed_webhook(&completed_event(&session_id), WEBHOOK_SECRET, now))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(order::Entity::find().count(app.db.as_ref()).await.unwrap(), 1);

    // the client-side confirmation sees the webhook's order
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/confirm",
            Some(json!({ "sessionId": session_id })),
            Some(user),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order::Entity::find().count(app.db.as_ref()).await.unwrap(), 1);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let app = TestApp::new().await;
    let session_id = paid_session(&app, Uuid::new_v4()).await;
    let now = Utc::now().timestamp();

    let response = app
        .send(signed_webhook(&completed_event(&session_id), "whsec_wrong", now))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let stale = now - 3_600;
    let response = app
        .send(signed_webhook(&completed_event(&session_id), WEBHOOK_SECRET, stale))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/payments/webhook")
                .body(Body::from(completed_event(&session_id).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(order::Entity::find().count(app.db.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn webhook_for_unpaid_session_is_acknowledged_without_an_order() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let lamp = app.seed_product("Lamp", 1500).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/session",
            Some(json!({ "items": [{ "productId": lamp, "quantity": 1 }] })),
            Some(user),
            &[],
        )
        .await;
    let body = response_json(response).await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();

    let response = app
        .send(signed_webhook(
            &completed_event(&session_id),
            WEBHOOK_SECRET,
            Utc::now().timestamp(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order::Entity::find().count(app.db.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn unrelated_webhook_events_are_acknowledged() {
    let app = TestApp::new().await;
    let payload = json!({
        "id": "evt_2",
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } }
    });
    let response = app
        .send(signed_webhook(&payload, WEBHOOK_SECRET, Utc::now().timestamp()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.gateway.status_calls(), 0);
}

#[tokio::test]
async fn webhooks_are_unsigned_when_no_secret_is_configured() {
    let app = TestApp::with_config(|cfg| cfg.payment_webhook_secret = None).await;
    let session_id = paid_session(&app, Uuid::new_v4()).await;

    let response = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/payments/webhook")
                .body(Body::from(completed_event(&session_id).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order::Entity::find().count(app.db.as_ref()).await.unwrap(), 1);
}

#[tokio::test]
async fn malformed_webhook_payload_is_a_bad_request() {
    let app = TestApp::with_config(|cfg| cfg.payment_webhook_secret = None).await;
    let response = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/payments/webhook")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn idempotency_key_is_forwarded_to_the_gateway() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Lamp", 1500).await;
    let user = Uuid::new_v4();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/checkout/session")
        .header("content-type", "application/json")
        .header("x-user-id", user.to_string())
        .header("idempotency-key", "cart-42")
        .body(Body::from(
            json!({ "items": [{ "productId": lamp, "quantity": 1 }] }).to_string(),
        ))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let forwarded = app.gateway.last_request().unwrap();
    assert_eq!(forwarded.idempotency_key.as_deref(), Some("cart-42"));
}

#[tokio::test]
async fn webhook_for_a_foreign_session_is_acknowledged() {
    let app = TestApp::new().await;
    app.gateway.insert_foreign_session("cs_live_paymentlink", 4_200);

    let response = app
        .send(signed_webhook(
            &completed_event("cs_live_paymentlink"),
            WEBHOOK_SECRET,
            Utc::now().timestamp(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.gateway.status_calls(), 1);
    assert_eq!(order::Entity::find().count(app.db.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_session_id_is_rejected_before_the_gateway() {
    let app = TestApp::new().await;
    for session_id in ["", "cs_1/../../v1/charges", "pi_123", " cs_test_1"] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/checkout/confirm",
                Some(json!({ "sessionId": session_id })),
                Some(Uuid::new_v4()),
                &[],
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{:?}", session_id);
        let body = response_json(response).await;
        assert_eq!(body["error"], "Bad Request");
    }
    assert_eq!(app.gateway.status_calls(), 0);
}

#[tokio::test]
async fn unparsable_analytics_window_uses_the_error_envelope() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::GET,
            "/api/v1/analytics?days=abc",
            None,
            Some(Uuid::new_v4()),
            &["admin"],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Bad Request");
    assert!(body["message"].as_str().unwrap().contains("days"));
}
