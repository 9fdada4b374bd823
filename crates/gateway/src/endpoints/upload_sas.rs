//! # POST /upload/sas
//!
//! 1Blob限定・書き込み専用の署名付きアップロードURLを発行する。

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use upload_sas_types::{UploadSasRequest, UploadSasResponse};

use crate::config::GatewayState;
use crate::error::GatewayError;

/// POST /upload/sas — 署名付きURL発行。
///
/// ボディのパース失敗（JSON不正・Content-Type不一致・型不一致）も400として扱う。
pub async fn handle_upload_sas(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<UploadSasRequest>, JsonRejection>,
) -> Result<Json<UploadSasResponse>, GatewayError> {
    let Json(body) = body.map_err(|e| {
        GatewayError::BadRequest(format!("リクエストボディが不正です: {}", e.body_text()))
    })?;

    let grant = state.issuer.issue_upload_grant(&body).await?;

    Ok(Json(UploadSasResponse {
        upload_url: grant.upload_url.to_string(),
        blob_name: grant.object_key,
        expires_in_minutes: grant.expires_in_minutes,
    }))
}
