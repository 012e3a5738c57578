//! Attribute Handlers
//!
//! `FetchAttributes` refreshes the caller's stored attributes;
//! `RequestAttributes` issues a certificate carrying the requested ones.
//! Both answer request problems with a status in the body and reserve HTTP
//! errors for malformed JSON and infrastructure faults.

use aca_core::{FetchAttributesRequest, FetchAttributesResponse, RequestAttributesRequest, RequestAttributesResponse};
use axum::extract::rejection::JsonRejection;
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

use super::AppState;
use crate::api::error::ApiError;

/// Refresh the caller's attributes from the source
///
/// POST /v1/aca/attributes/fetch
pub async fn fetch_attributes(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FetchAttributesRequest>, JsonRejection>,
) -> Result<Json<FetchAttributesResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let response = state.pipeline.fetch_attributes(request).await?;
    info!(status = ?response.status, "FetchAttributes");

    Ok(Json(response))
}

/// Issue an attribute certificate
///
/// POST /v1/aca/attributes/request
pub async fn request_attributes(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RequestAttributesRequest>, JsonRejection>,
) -> Result<Json<RequestAttributesResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let response = state.pipeline.request_attributes(request).await?;
    info!(status = ?response.status, "RequestAttributes");

    Ok(Json(response))
}
