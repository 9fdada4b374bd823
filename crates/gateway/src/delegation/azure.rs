//! # Blobサービスからのユーザー委任キー取得
//!
//! `POST {blob_endpoint}/?restype=service&comp=userdelegationkey` に
//! Bearerトークン付きで `<KeyInfo>` を送り、`<UserDelegationKey>` を受け取る。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use super::{format_timestamp, parse_timestamp, DelegationKeyProvider, UserDelegationKey};
use crate::error::GatewayError;
use crate::identity::{TokenCredential, STORAGE_SCOPE};

/// 委任キー要求に使うストレージサービスバージョン
pub const STORAGE_API_VERSION: &str = "2022-11-02";

/// 委任キー要求のタイムアウト
const DELEGATION_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// `<UserDelegationKey>` 応答。
#[derive(Debug, Deserialize)]
#[serde(rename = "UserDelegationKey", rename_all = "PascalCase")]
struct UserDelegationKeyXml {
    signed_oid: String,
    signed_tid: String,
    signed_start: String,
    signed_expiry: String,
    signed_service: String,
    signed_version: String,
    value: String,
}

/// ストレージのエラー応答。
#[derive(Debug, Deserialize)]
#[serde(rename = "Error", rename_all = "PascalCase")]
struct StorageErrorXml {
    code: String,
    #[serde(default)]
    message: Option<String>,
}

/// Blobサービスから委任キーを取得する実装。
pub struct AzureDelegationKeyProvider {
    http_client: reqwest::Client,
    blob_endpoint: Url,
    credential: Arc<dyn TokenCredential>,
}

impl AzureDelegationKeyProvider {
    /// 新しいプロバイダを作成する。
    pub fn new(
        http_client: reqwest::Client,
        blob_endpoint: Url,
        credential: Arc<dyn TokenCredential>,
    ) -> Self {
        Self {
            http_client,
            blob_endpoint,
            credential,
        }
    }

    fn request_url(&self) -> Url {
        let mut url = self.blob_endpoint.clone();
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("restype", "service")
            .append_pair("comp", "userdelegationkey");
        url
    }
}

/// `<KeyInfo>` リクエストボディを構築する。
fn key_info_body(start: &DateTime<Utc>, expiry: &DateTime<Utc>) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <KeyInfo><Start>{}</Start><Expiry>{}</Expiry></KeyInfo>",
        format_timestamp(start),
        format_timestamp(expiry)
    )
}

/// `<UserDelegationKey>` 応答をパースする。
pub(crate) fn parse_user_delegation_key(xml: &str) -> Result<UserDelegationKey, GatewayError> {
    // quick-xmlはルート要素名を検証しないため、明示的に確認する
    if !xml.contains("<UserDelegationKey") {
        return Err(GatewayError::Credential(
            "想定外の応答: UserDelegationKey要素がありません".to_string(),
        ));
    }

    let parsed: UserDelegationKeyXml = quick_xml::de::from_str(xml)
        .map_err(|e| GatewayError::Credential(format!("委任キー応答のパースに失敗: {e}")))?;

    Ok(UserDelegationKey {
        signed_oid: parsed.signed_oid,
        signed_tid: parsed.signed_tid,
        signed_start: parse_timestamp(&parsed.signed_start)?,
        signed_expiry: parse_timestamp(&parsed.signed_expiry)?,
        signed_service: parsed.signed_service,
        signed_version: parsed.signed_version,
        value: parsed.value,
    })
}

/// エラー応答から `Code: Message` を取り出す。XMLでなければ本文をそのまま返す。
fn describe_storage_error(body: &str) -> String {
    match quick_xml::de::from_str::<StorageErrorXml>(body) {
        Ok(error) => format!("{}: {}", error.code, error.message.unwrap_or_default()),
        Err(_) => body.to_string(),
    }
}

#[async_trait::async_trait]
impl DelegationKeyProvider for AzureDelegationKeyProvider {
    async fn delegation_key(
        &self,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<UserDelegationKey, GatewayError> {
        let token = self.credential.get_token(STORAGE_SCOPE).await?;
        let request_id = uuid::Uuid::new_v4().to_string();
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();

        let response = self
            .http_client
            .post(self.request_url())
            .bearer_auth(&token.token)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header("x-ms-date", date)
            .header("x-ms-client-request-id", &request_id)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(key_info_body(&start, &expiry))
            .timeout(DELEGATION_REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                GatewayError::Credential(format!(
                    "委任キー要求の送信に失敗 (request_id={request_id}): {e}"
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            GatewayError::Credential(format!(
                "委任キー応答の読み取りに失敗 (request_id={request_id}): {e}"
            ))
        })?;

        if !status.is_success() {
            return Err(GatewayError::Credential(format!(
                "委任キー要求が拒否されました: HTTP {status} - {} (request_id={request_id})",
                describe_storage_error(&body)
            )));
        }

        let key = parse_user_delegation_key(&body)?;
        tracing::debug!(
            request_id = %request_id,
            signed_start = %key.signed_start,
            signed_expiry = %key.signed_expiry,
            "ユーザー委任キーを取得"
        );
        Ok(key)
    }
}
