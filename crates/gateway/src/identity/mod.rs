//! # アイデンティティ（アクセストークン取得）
//!
//! ストレージに対するBearerトークンの取得を抽象化する。
//!
//! ## 実装
//! - `ClientSecretCredential`: 環境変数のサービスプリンシパル（クライアントシークレット）
//! - `ManagedIdentityCredential`: マネージドID（App Service / IMDS）
//! - `DefaultCredentialChain`: 上記を順に試す

pub mod client_secret;
pub mod managed;

pub use client_secret::ClientSecretCredential;
pub use managed::ManagedIdentityCredential;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::error::GatewayError;

/// Blob Storageのスコープ（OAuth2 v2.0）
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// トークン取得リクエストのタイムアウト
pub(crate) const TOKEN_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Bearerアクセストークン。
#[derive(Clone)]
pub struct AccessToken {
    /// トークン文字列
    pub token: String,
    /// 有効期限
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// アクセストークンを取得するトレイト。
#[async_trait::async_trait]
pub trait TokenCredential: Send + Sync {
    /// 指定スコープのアクセストークンを取得する。
    async fn get_token(&self, scope: &str) -> Result<AccessToken, GatewayError>;
}

/// v2.0スコープ（`…/.default`）をv1リソースURIに変換する。
pub(crate) fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

/// 数値・文字列どちらの表現も受け付ける整数。
/// マネージドIDエンドポイントは `expires_in` を文字列で返す。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum NumberOrString {
    Number(i64),
    String(String),
}

impl NumberOrString {
    fn as_i64(&self) -> Option<i64> {
        match self {
            NumberOrString::Number(n) => Some(*n),
            NumberOrString::String(s) => s.trim().parse().ok(),
        }
    }
}

/// トークンエンドポイントの成功レスポンス。
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<NumberOrString>,
    #[serde(default)]
    pub expires_on: Option<NumberOrString>,
}

impl TokenResponse {
    /// 有効期限を解決して `AccessToken` に変換する。
    /// `expires_in`（相対秒）を優先し、なければ `expires_on`（UNIX秒）を使う。
    pub fn into_access_token(self, now: DateTime<Utc>) -> Result<AccessToken, GatewayError> {
        let expires_at = if let Some(secs) = self.expires_in.as_ref().and_then(|v| v.as_i64()) {
            now + TimeDelta::seconds(secs)
        } else if let Some(ts) = self.expires_on.as_ref().and_then(|v| v.as_i64()) {
            DateTime::<Utc>::from_timestamp(ts, 0).ok_or_else(|| {
                GatewayError::Credential(format!("expires_onが範囲外です: {ts}"))
            })?
        } else {
            return Err(GatewayError::Credential(
                "トークンレスポンスに有効期限がありません".to_string(),
            ));
        };

        Ok(AccessToken {
            token: self.access_token,
            expires_at,
        })
    }
}

/// 複数の資格情報を順に試す既定チェーン。
///
/// 全て失敗した場合は各失敗理由を連結したエラーを返す（ログ出力専用）。
pub struct DefaultCredentialChain {
    sources: Vec<(&'static str, Box<dyn TokenCredential>)>,
}

impl DefaultCredentialChain {
    /// 任意の資格情報列から構築する。
    pub fn new(sources: Vec<(&'static str, Box<dyn TokenCredential>)>) -> Self {
        Self { sources }
    }

    /// 環境変数から構築する。
    /// クライアントシークレットが揃っていれば先頭に置き、マネージドIDを続ける。
    pub fn from_env(http_client: reqwest::Client) -> Self {
        let mut sources: Vec<(&'static str, Box<dyn TokenCredential>)> = Vec::new();
        if let Some(cred) = ClientSecretCredential::from_env(http_client.clone()) {
            tracing::info!("環境変数のクライアントシークレットを資格情報チェーンに追加");
            sources.push(("client_secret", Box::new(cred)));
        }
        sources.push((
            "managed_identity",
            Box::new(ManagedIdentityCredential::from_env(http_client)),
        ));
        Self::new(sources)
    }
}

#[async_trait::async_trait]
impl TokenCredential for DefaultCredentialChain {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, GatewayError> {
        let mut failures = Vec::with_capacity(self.sources.len());
        for (name, source) in &self.sources {
            match source.get_token(scope).await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    tracing::debug!(source = *name, error = %e, "資格情報の取得に失敗、次を試行");
                    failures.push(format!("{name}: {e}"));
                }
            }
        }
        Err(GatewayError::Credential(format!(
            "利用可能な資格情報がありません [{}]",
            failures.join("; ")
        )))
    }
}
