//! # クライアントシークレット資格情報
//!
//! サービスプリンシパルのクライアントシークレットでOAuth2 client_credentialsフローを実行する。
//! `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET` が全て設定されている場合のみ有効。

use chrono::Utc;

use super::{AccessToken, TokenCredential, TokenResponse, TOKEN_REQUEST_TIMEOUT};
use crate::error::GatewayError;

/// 既定の認証機関ホスト
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// クライアントシークレットによる資格情報。
pub struct ClientSecretCredential {
    http_client: reqwest::Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl ClientSecretCredential {
    /// 新しい資格情報を作成する。
    pub fn new(
        http_client: reqwest::Client,
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        Self {
            http_client,
            authority_host: authority_host.trim_end_matches('/').to_string(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }

    /// 環境変数から構築する。必要な変数が揃っていなければ `None`。
    pub fn from_env(http_client: reqwest::Client) -> Option<Self> {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let tenant_id = var("AZURE_TENANT_ID")?;
        let client_id = var("AZURE_CLIENT_ID")?;
        let client_secret = var("AZURE_CLIENT_SECRET")?;
        let authority_host =
            var("AZURE_AUTHORITY_HOST").unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());
        Some(Self::new(
            http_client,
            &authority_host,
            &tenant_id,
            &client_id,
            &client_secret,
        ))
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        )
    }
}

#[async_trait::async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, GatewayError> {
        let url = self.token_url();
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];

        let response = self
            .http_client
            .post(&url)
            .form(&form)
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GatewayError::Credential(format!("トークン要求の送信に失敗: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Credential(format!("トークン応答の読み取りに失敗: {e}")))?;

        if !status.is_success() {
            return Err(GatewayError::Credential(format!(
                "トークンエンドポイントがエラーを返しました: HTTP {status} - {body}"
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Credential(format!("トークン応答のパースに失敗: {e}")))?;
        parsed.into_access_token(Utc::now())
    }
}
