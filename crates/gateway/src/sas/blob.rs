//! # ユーザー委任SAS（Blob）
//!
//! サービスバージョン 2022-11-02 の署名文字列を組み立て、
//! 委任キーによる HMAC-SHA256 で署名する。対象は常に1つのBlob（`sr=b`）。

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use super::{BlobSasSigner, SasRequest};
use crate::delegation::{format_timestamp, UserDelegationKey};
use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// SASのサービスバージョン（sv）
pub const SAS_VERSION: &str = "2022-11-02";

/// 署名対象リソース種別: Blob
const SIGNED_RESOURCE_BLOB: &str = "b";

/// Base64エンジン（Standard）
fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// ユーザー委任キーでBlob SASを生成する実装。
pub struct UserDelegationSasSigner {
    account_name: String,
    blob_endpoint: Url,
}

impl UserDelegationSasSigner {
    /// 新しい署名器を作成する。
    pub fn new(account_name: &str, blob_endpoint: Url) -> Self {
        Self {
            account_name: account_name.to_string(),
            blob_endpoint,
        }
    }

    /// `/blob/{account}/{container}/{blob}`
    fn canonicalized_resource(&self, request: &SasRequest) -> String {
        format!(
            "/blob/{}/{}/{}",
            self.account_name, request.container, request.blob_name
        )
    }

    /// HTTPSエンドポイントならHTTPSのみ、それ以外（エミュレータ等）はHTTPも許可する。
    fn signed_protocol(&self) -> &'static str {
        if self.blob_endpoint.scheme() == "https" {
            "https"
        } else {
            "https,http"
        }
    }
}

/// 署名文字列（バージョン 2020-12-06 以降の形式）を組み立てる。
fn string_to_sign(
    permissions: &str,
    start: &str,
    expiry: &str,
    canonicalized_resource: &str,
    key: &UserDelegationKey,
    protocol: &str,
) -> String {
    let key_start = format_timestamp(&key.signed_start);
    let key_expiry = format_timestamp(&key.signed_expiry);
    [
        permissions,
        start,
        expiry,
        canonicalized_resource,
        key.signed_oid.as_str(),
        key.signed_tid.as_str(),
        key_start.as_str(),
        key_expiry.as_str(),
        key.signed_service.as_str(),
        key.signed_version.as_str(),
        "", // signedAuthorizedUserObjectId
        "", // signedUnauthorizedUserObjectId
        "", // signedCorrelationId
        "", // signedIP
        protocol,
        SAS_VERSION,
        SIGNED_RESOURCE_BLOB,
        "", // signedSnapshotTime
        "", // signedEncryptionScope
        "", // rscc
        "", // rscd
        "", // rsce
        "", // rscl
        "", // rsct
    ]
    .join("\n")
}

/// Base64エンコードされたキーで HMAC-SHA256 署名し、Base64で返す。
fn compute_signature(key_b64: &str, message: &str) -> Result<String, GatewayError> {
    let key_bytes = b64()
        .decode(key_b64.trim())
        .map_err(|e| GatewayError::Signing(format!("委任キーのBase64デコードに失敗: {e}")))?;
    let mut mac = HmacSha256::new_from_slice(&key_bytes)
        .map_err(|e| GatewayError::Signing(format!("HMACの初期化に失敗: {e}")))?;
    mac.update(message.as_bytes());
    Ok(b64().encode(mac.finalize().into_bytes()))
}

impl BlobSasSigner for UserDelegationSasSigner {
    fn sign(&self, request: &SasRequest, key: &UserDelegationKey) -> Result<url::Url, GatewayError> {
        if request.expiry <= request.start {
            return Err(GatewayError::Signing(format!(
                "有効期限が開始時刻以前です: start={} expiry={}",
                request.start, request.expiry
            )));
        }

        let mut url = self.blob_endpoint.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| {
                GatewayError::Signing(format!(
                    "Blobエンドポイントがベースにできません: {}",
                    self.blob_endpoint
                ))
            })?
            .pop_if_empty()
            .push(&request.container)
            .push(&request.blob_name);

        let permissions = request.permissions.as_sp();
        let start = format_timestamp(&request.start);
        let expiry = format_timestamp(&request.expiry);
        let protocol = self.signed_protocol();

        let to_sign = string_to_sign(
            &permissions,
            &start,
            &expiry,
            &self.canonicalized_resource(request),
            key,
            protocol,
        );
        let signature = compute_signature(&key.value, &to_sign)?;

        url.query_pairs_mut()
            .append_pair("sv", SAS_VERSION)
            .append_pair("sr", SIGNED_RESOURCE_BLOB)
            .append_pair("st", &start)
            .append_pair("se", &expiry)
            .append_pair("sp", &permissions)
            .append_pair("spr", protocol)
            .append_pair("skoid", &key.signed_oid)
            .append_pair("sktid", &key.signed_tid)
            .append_pair("skt", &format_timestamp(&key.signed_start))
            .append_pair("ske", &format_timestamp(&key.signed_expiry))
            .append_pair("sks", &key.signed_service)
            .append_pair("skv", &key.signed_version)
            .append_pair("sig", &signature);

        Ok(url)
    }
}
