//! # ユーザー委任キー
//!
//! 署名付きURLの署名に使う短命キーの取得を抽象化する。
//! 長期のストレージアカウントキーは一切扱わない。
//!
//! ## 実装
//! - `AzureDelegationKeyProvider`: Blobサービスの `userdelegationkey` API から取得
//! - `CachedDelegationKeyProvider`: 有効期間内のキーを再利用するラッパー

pub mod azure;
pub mod cache;

pub use azure::AzureDelegationKeyProvider;
pub use cache::CachedDelegationKeyProvider;

use chrono::{DateTime, Utc};

use crate::error::GatewayError;

/// ストレージサービスが発行したユーザー委任キー。
#[derive(Clone, PartialEq, Eq)]
pub struct UserDelegationKey {
    /// 委任元プリンシパルのオブジェクトID（skoid）
    pub signed_oid: String,
    /// 委任元プリンシパルのテナントID（sktid）
    pub signed_tid: String,
    /// キーの有効開始時刻（skt）
    pub signed_start: DateTime<Utc>,
    /// キーの有効期限（ske）
    pub signed_expiry: DateTime<Utc>,
    /// 対象サービス（sks、Blobは "b"）
    pub signed_service: String,
    /// キー発行時のサービスバージョン（skv）
    pub signed_version: String,
    /// Base64エンコードされたHMACキー
    pub value: String,
}

impl UserDelegationKey {
    /// `[start, expiry]` をこのキーの有効期間が包含するか。
    pub fn covers(&self, start: DateTime<Utc>, expiry: DateTime<Utc>) -> bool {
        self.signed_start <= start && expiry <= self.signed_expiry
    }
}

impl std::fmt::Debug for UserDelegationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDelegationKey")
            .field("signed_oid", &self.signed_oid)
            .field("signed_tid", &self.signed_tid)
            .field("signed_start", &self.signed_start)
            .field("signed_expiry", &self.signed_expiry)
            .field("signed_service", &self.signed_service)
            .field("signed_version", &self.signed_version)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// 委任キーを取得するトレイト。
///
/// `[start, expiry]` の期間有効なキーを返す。テストでは固定キーを返す実装に差し替える。
#[async_trait::async_trait]
pub trait DelegationKeyProvider: Send + Sync {
    /// 指定期間有効な委任キーを取得する。
    async fn delegation_key(
        &self,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<UserDelegationKey, GatewayError>;
}

/// ストレージAPIの時刻表記（秒精度のISO 8601、UTC）。
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// ストレージAPIの時刻表記をパースする。小数秒付きも受け付ける。
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, GatewayError> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| GatewayError::Credential(format!("時刻のパースに失敗 ({s}): {e}")))
}
