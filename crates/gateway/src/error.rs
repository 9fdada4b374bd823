//! # Gateway エラー型
//!
//! クライアント起因（400）と環境起因（500）の2系統のみ。
//! 500系の詳細はサーバーログにのみ出力し、レスポンスには含めない。

use axum::http::StatusCode;

/// 500系レスポンスの本文。原因は一切含めない。
pub const GENERIC_SERVER_ERROR: &str = "内部エラーが発生しました";

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 不正なリクエスト（欠落・空・許可外文字・JSON不正）
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// 委任キー・アクセストークンの取得に失敗
    #[error("署名用資格情報の取得に失敗: {0}")]
    Credential(String),
    /// 署名付きURLの構築に失敗
    #[error("署名付きURLの構築に失敗: {0}")]
    Signing(String),
}

impl GatewayError {
    /// HTTPステータスコード。
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Credential(_) | GatewayError::Signing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status == StatusCode::BAD_REQUEST {
            tracing::warn!(reason = %self, "リクエストを拒否しました");
            return (status, self.to_string()).into_response();
        }
        tracing::error!(error = %self, "SAS発行に失敗");
        (status, GENERIC_SERVER_ERROR).into_response()
    }
}
