//! Trust Anchor Handler

use aca_core::RootCertificateResponse;
use axum::{extract::State, Json};
use std::sync::Arc;

use super::AppState;

/// Return the authority's own certificate; unauthenticated
///
/// GET /v1/aca/certificate
pub async fn read_certificate(State(state): State<Arc<AppState>>) -> Json<RootCertificateResponse> {
    Json(state.pipeline.read_root_certificate())
}
