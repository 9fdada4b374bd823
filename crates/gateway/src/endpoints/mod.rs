//! # Gatewayエンドポイント

pub mod upload_sas;

pub use upload_sas::handle_upload_sas;

use std::sync::Arc;

use crate::config::GatewayState;

/// axumルーターを構築する。
pub fn router(state: Arc<GatewayState>) -> axum::Router {
    axum::Router::new()
        .route("/upload/sas", axum::routing::post(handle_upload_sas))
        .with_state(state)
}
