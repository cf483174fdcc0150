use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sandbox_executor::{CallRequest, CreateAccountRequest, DeployRequest, Sandbox};
use serde::Serialize;

use crate::{ApiError, Result};

pub async fn create_account(
    State(sandbox): State<Arc<Sandbox>>,
    body: std::result::Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body?;
    let response = blocking(sandbox, move |sandbox| sandbox.create_account(request)).await?;
    encode(&response)
}

pub async fn create_contract(
    State(sandbox): State<Arc<Sandbox>>,
    body: std::result::Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body?;
    let response = blocking(sandbox, move |sandbox| sandbox.deploy(request)).await?;
    encode(&response)
}

pub async fn call_contract(
    State(sandbox): State<Arc<Sandbox>>,
    body: std::result::Result<Json<CallRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body?;
    let response = blocking(sandbox, move |sandbox| sandbox.call(request)).await?;
    encode(&response)
}

pub async fn get_account(
    State(sandbox): State<Arc<Sandbox>>,
    Path(address): Path<String>,
) -> Result<Response> {
    let lookup = address.clone();
    match blocking(sandbox, move |sandbox| sandbox.account(&lookup)).await? {
        Some(view) => encode(&view),
        None => Err(ApiError::NotFound(address)),
    }
}

pub async fn health() -> &'static str {
    "OK"
}

/// Runs a sandbox operation on the blocking pool; interpretation can take
/// a while and recurses deeply.
async fn blocking<T, F>(sandbox: Arc<Sandbox>, operation: F) -> Result<T>
where
    F: FnOnce(&Sandbox) -> sandbox_executor::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let outcome = tokio::task::spawn_blocking(move || operation(&sandbox))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(outcome?)
}

fn encode<T: Serialize>(value: &T) -> Result<Response> {
    let body = serde_json::to_vec(value)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
