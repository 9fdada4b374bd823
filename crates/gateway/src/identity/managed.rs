//! # マネージドID資格情報
//!
//! ホスト環境が提供するマネージドIDエンドポイントからトークンを取得する。
//!
//! ## エンドポイント
//! - App Service / Functions: `IDENTITY_ENDPOINT` + `IDENTITY_HEADER`（api-version 2019-08-01）
//! - それ以外: IMDS `http://169.254.169.254/metadata/identity/oauth2/token`（api-version 2018-02-01）
//!
//! ユーザー割り当てIDを使う場合は `AZURE_CLIENT_ID` を指定する。

use chrono::Utc;
use url::Url;

use super::{scope_to_resource, AccessToken, TokenCredential, TokenResponse, TOKEN_REQUEST_TIMEOUT};
use crate::error::GatewayError;

/// IMDSのトークンエンドポイント
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// マネージドIDエンドポイントの種別。
#[derive(Debug, Clone)]
pub enum ManagedIdentitySource {
    /// App Service / Functions のローカルエンドポイント
    AppService {
        /// `IDENTITY_ENDPOINT`
        endpoint: String,
        /// `IDENTITY_HEADER`（`X-IDENTITY-HEADER` として送信）
        secret: String,
    },
    /// Azure Instance Metadata Service
    Imds {
        /// エンドポイントURL
        endpoint: String,
    },
}

impl ManagedIdentitySource {
    fn api_version(&self) -> &'static str {
        match self {
            ManagedIdentitySource::AppService { .. } => "2019-08-01",
            ManagedIdentitySource::Imds { .. } => "2018-02-01",
        }
    }

    fn endpoint(&self) -> &str {
        match self {
            ManagedIdentitySource::AppService { endpoint, .. } => endpoint,
            ManagedIdentitySource::Imds { endpoint } => endpoint,
        }
    }
}

/// マネージドIDによる資格情報。
pub struct ManagedIdentityCredential {
    http_client: reqwest::Client,
    source: ManagedIdentitySource,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    /// 新しい資格情報を作成する。
    pub fn new(
        http_client: reqwest::Client,
        source: ManagedIdentitySource,
        client_id: Option<String>,
    ) -> Self {
        Self {
            http_client,
            source,
            client_id,
        }
    }

    /// 環境変数から構築する。
    pub fn from_env(http_client: reqwest::Client) -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let source = match (var("IDENTITY_ENDPOINT"), var("IDENTITY_HEADER")) {
            (Some(endpoint), Some(secret)) => {
                tracing::info!(identity_endpoint = %endpoint, "App ServiceのマネージドIDを使用");
                ManagedIdentitySource::AppService { endpoint, secret }
            }
            _ => ManagedIdentitySource::Imds {
                endpoint: IMDS_ENDPOINT.to_string(),
            },
        };
        Self::new(http_client, source, var("AZURE_CLIENT_ID"))
    }

    fn token_url(&self, scope: &str) -> Result<Url, GatewayError> {
        let mut url = Url::parse(self.source.endpoint()).map_err(|e| {
            GatewayError::Credential(format!("マネージドIDエンドポイントが不正です: {e}"))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("api-version", self.source.api_version())
                .append_pair("resource", scope_to_resource(scope));
            if let Some(client_id) = &self.client_id {
                query.append_pair("client_id", client_id);
            }
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, GatewayError> {
        let url = self.token_url(scope)?;
        let request = self.http_client.get(url).timeout(TOKEN_REQUEST_TIMEOUT);
        let request = match &self.source {
            ManagedIdentitySource::AppService { secret, .. } => {
                request.header("X-IDENTITY-HEADER", secret)
            }
            ManagedIdentitySource::Imds { .. } => request.header("Metadata", "true"),
        };

        let response = request.send().await.map_err(|e| {
            GatewayError::Credential(format!("マネージドIDエンドポイントへの接続に失敗: {e}"))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Credential(format!("トークン応答の読み取りに失敗: {e}")))?;

        if !status.is_success() {
            return Err(GatewayError::Credential(format!(
                "マネージドIDエンドポイントがエラーを返しました: HTTP {status} - {body}"
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Credential(format!("トークン応答のパースに失敗: {e}")))?;
        parsed.into_access_token(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::STORAGE_SCOPE;
    use crate::test_helpers::start_mock_server;
    use axum::extract::Query;
    use axum::http::HeaderMap;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_imds_request_shape() {
        let app = axum::Router::new().route(
            "/metadata/identity/oauth2/token",
            axum::routing::get(
                |headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(headers.get("Metadata").unwrap(), "true");
                    assert_eq!(q["api-version"], "2018-02-01");
                    assert_eq!(q["resource"], "https://storage.azure.com");
                    assert_eq!(q["client_id"], "uami-1");
                    axum::Json(serde_json::json!({
                        "access_token": "mi-token",
                        "expires_in": "86399",
                        "expires_on": "1900000000",
                        "token_type": "Bearer"
                    }))
                },
            ),
        );
        let port = start_mock_server(app).await;

        let cred = ManagedIdentityCredential::new(
            reqwest::Client::new(),
            ManagedIdentitySource::Imds {
                endpoint: format!("http://127.0.0.1:{port}/metadata/identity/oauth2/token"),
            },
            Some("uami-1".to_string()),
        );
        let token = cred.get_token(STORAGE_SCOPE).await.unwrap();
        assert_eq!(token.token, "mi-token");
    }

    #[tokio::test]
    async fn test_app_service_sends_identity_header() {
        let app = axum::Router::new().route(
            "/msi/token",
            axum::routing::get(
                |headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(headers.get("X-IDENTITY-HEADER").unwrap(), "hdr-secret");
                    assert_eq!(q["api-version"], "2019-08-01");
                    assert!(!q.contains_key("client_id"));
                    axum::Json(serde_json::json!({
                        "access_token": "app-token",
                        "expires_on": "1900000000"
                    }))
                },
            ),
        );
        let port = start_mock_server(app).await;

        let cred = ManagedIdentityCredential::new(
            reqwest::Client::new(),
            ManagedIdentitySource::AppService {
                endpoint: format!("http://127.0.0.1:{port}/msi/token"),
                secret: "hdr-secret".to_string(),
            },
            None,
        );
        let token = cred.get_token(STORAGE_SCOPE).await.unwrap();
        assert_eq!(token.token, "app-token");
        assert_eq!(token.expires_at.timestamp(), 1_900_000_000);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_credential_error() {
        // 予約ポート0への接続は必ず失敗する
        let cred = ManagedIdentityCredential::new(
            reqwest::Client::new(),
            ManagedIdentitySource::Imds {
                endpoint: "http://127.0.0.1:0/token".to_string(),
            },
            None,
        );
        let err = cred.get_token(STORAGE_SCOPE).await.unwrap_err();
        assert!(matches!(err, GatewayError::Credential(_)));
    }
}
