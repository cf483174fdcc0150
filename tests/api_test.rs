use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use evm_sandbox::Config;
use serde_json::{json, Value};
use std::io::Write;
use tempfile::NamedTempFile;
use tower::ServiceExt;

// Init code deploying a runtime that returns the word 42.
const RETURN_42: &str = "0x600a600c600039600a6000f3602a60005260206000f3";
const FIRST_ACCOUNT: &str = "0x00000000000000000000000000000000000003e8";

fn app() -> Router {
    evm_sandbox::app(&Config::default()).unwrap().1
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<String>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body.to_string())).await
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

#[tokio::test]
async fn test_create_account() {
    let app = app();
    let (status, body) = post(&app, "/account/create", json!({"balance": 1000})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "account created");
    assert_eq!(body["address"], FIRST_ACCOUNT);

    let (status, body) = get(&app, &format!("/account/{}", FIRST_ACCOUNT)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "1000");
    assert_eq!(body["nonce"], 0);
}

#[tokio::test]
async fn test_deploy_and_call() {
    let app = app();
    post(&app, "/account/create", json!({"balance": 0})).await;

    let (status, deployed) = post(
        &app,
        "/contract/create",
        json!({"from": FIRST_ACCOUNT, "value": 0, "input": "", "code": RETURN_42}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deployed["status"], "success", "{}", deployed);
    assert_eq!(deployed["message"], "contract created");
    assert_eq!(deployed["output"], "602a60005260206000f3");
    assert!(deployed["gasLeft"].as_str().unwrap().parse::<u64>().is_ok());
    let address = deployed["address"].as_str().unwrap().to_string();

    let (status, called) = post(
        &app,
        "/contract/call",
        json!({"from": FIRST_ACCOUNT, "to": address, "value": 0, "input": "0x"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(called["status"], "success");
    assert_eq!(called["message"], "contract called");
    assert_eq!(called["output"], format!("{:064x}", 42));
    assert!(called.get("address").is_none());

    let (status, view) = get(&app, &format!("/account/{}", address)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["code"], "602a60005260206000f3");
    assert_eq!(view["nonce"], 1);
}

#[tokio::test]
async fn test_execution_failure_is_reported_in_body() {
    let app = app();
    let (status, body) = post(
        &app,
        "/contract/create",
        json!({"from": FIRST_ACCOUNT, "value": 0, "input": "", "code": "0xfe"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "contract creation failed, err: invalid opcode: 0xfe");
    assert_eq!(body["gasLeft"], "0");
    assert!(body.get("address").is_none());

    let (status, body) = post(
        &app,
        "/contract/call",
        json!({"from": FIRST_ACCOUNT, "to": "0xbeef", "value": 5, "input": ""}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert_eq!(
        body["message"],
        "contract call failed, err: insufficient balance for transfer"
    );
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/account/create",
        Some("{\"balance\": ".to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, _) = post(&app, "/account/create", json!({"balance": "lots"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, &format!("/account/{}", FIRST_ACCOUNT)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_fields_are_rejected_without_mutation() {
    let app = app();
    let (status, body) = post(&app, "/account/create", json!({"balance": -1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "negative amount: -1");

    let (status, body) = post(
        &app,
        "/contract/create",
        json!({"from": FIRST_ACCOUNT, "code": "0x60zz"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, _) = get(&app, &format!("/account/{}", FIRST_ACCOUNT)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get(&app, "/account/0xnothex").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_block_parameters_from_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[block]\nchain_id = 31337\n\n[execution]\nfirst_account_index = 4096").unwrap();
    let config = Config::from_file(file.path()).unwrap();
    let (_, app) = evm_sandbox::app(&config).unwrap();

    let (_, created) = post(&app, "/account/create", json!({})).await;
    assert_eq!(created["address"], "0x0000000000000000000000000000000000001000");

    // CHAINID, stored as the runtime code: PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN.
    let (status, deployed) = post(
        &app,
        "/contract/create",
        json!({"from": created["address"], "code": "4660005260206000f3"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deployed["status"], "success", "{}", deployed);
    assert_eq!(deployed["output"], format!("{:064x}", 31337));
}
