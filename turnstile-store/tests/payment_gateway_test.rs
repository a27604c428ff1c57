use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use turnstile_core::{ChargeRequest, GatewayError, PaymentGateway};
use turnstile_shared::Masked;
use turnstile_store::app_config::{GatewayConfig, GatewayMode};
use turnstile_store::HttpPaymentGateway;

async fn snap(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("Basic "))
        .unwrap_or(false);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})));
    }

    let order_id = body["transaction_details"]["order_id"].as_str().unwrap_or_default();
    if order_id == "reject-me" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error_messages": ["order_id has already been taken"]})),
        );
    }
    assert_eq!(body["transaction_details"]["gross_amount"], 75_000);
    assert_eq!(body["item_details"][0]["quantity"], 1);

    (StatusCode::CREATED, Json(json!({"token": format!("tok-{}", order_id)})))
}

async fn cancel(Path(order_id): Path<String>) -> StatusCode {
    if order_id == "unknown" {
        StatusCode::NOT_FOUND
    } else if order_id == "settled" {
        StatusCode::PRECONDITION_FAILED
    } else {
        StatusCode::OK
    }
}

async fn spawn_gateway() -> String {
    let app = Router::new()
        .route("/snap/v1/transactions", post(snap))
        .route("/v2/{order_id}/cancel", post(cancel));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn gateway_for(base: &str) -> HttpPaymentGateway {
    HttpPaymentGateway::new(&GatewayConfig {
        mode: GatewayMode::Http,
        snap_url: format!("{}/snap/v1/transactions", base),
        api_url: format!("{}/v2", base),
        redirect_url: "https://pay.example.test/vtweb/".into(),
        server_key: Masked("server-key".to_string()),
        timeout_secs: 5,
        circuit_failure_threshold: 5,
        circuit_reset_secs: 30,
    })
    .unwrap()
}

fn charge(order_id: &str) -> ChargeRequest {
    ChargeRequest {
        order_id: order_id.into(),
        amount: 75_000,
        description: "General admission".into(),
        customer: "user-7".into(),
    }
}

#[tokio::test]
async fn test_initiate_builds_redirect_from_token() {
    let base = spawn_gateway().await;
    let gateway = gateway_for(&base);

    let session = gateway.initiate(&charge("order-1")).await.unwrap();

    assert_eq!(session.order_id, "order-1");
    assert_eq!(session.token.as_deref(), Some("tok-order-1"));
    assert_eq!(session.redirect_url, "https://pay.example.test/vtweb/tok-order-1");
}

#[tokio::test]
async fn test_initiate_surfaces_rejection() {
    let base = spawn_gateway().await;
    let gateway = gateway_for(&base);

    let err = gateway.initiate(&charge("reject-me")).await.unwrap_err();

    match err {
        GatewayError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("already been taken"));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_tolerates_unknown_charge() {
    let base = spawn_gateway().await;
    let gateway = gateway_for(&base);

    gateway.cancel("order-1").await.unwrap();
    gateway.cancel("unknown").await.unwrap();

    let err = gateway.cancel("settled").await.unwrap_err();
    assert!(matches!(err, GatewayError::Rejected { status: 412, .. }));
}

#[tokio::test]
async fn test_unreachable_gateway_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = gateway_for(&format!("http://{}", addr));
    let err = gateway.initiate(&charge("order-2")).await.unwrap_err();

    assert!(matches!(err, GatewayError::Transport(_)));
}
