//! # 委任キーキャッシュ
//!
//! 要求期間を包含する間は取得済みキーを返し、包含しなくなったら再取得して置き換える。
//! 読み取りは共有ロック、更新は排他ロック下で再確認してから行う。

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;

use super::{DelegationKeyProvider, UserDelegationKey};
use crate::error::GatewayError;

/// 再取得時に要求するキー有効期間の下限（時間）
pub const DEFAULT_MIN_KEY_LIFETIME_HOURS: i64 = 1;

/// ユーザー委任キーの最大有効期間（日）
pub const MAX_KEY_LIFETIME_DAYS: i64 = 7;

/// 委任キーをキャッシュするプロバイダ。
pub struct CachedDelegationKeyProvider<P> {
    inner: P,
    min_lifetime: TimeDelta,
    cached: RwLock<Option<UserDelegationKey>>,
}

impl<P: DelegationKeyProvider> CachedDelegationKeyProvider<P> {
    /// 既定の有効期間（1時間）でラップする。
    pub fn new(inner: P) -> Self {
        Self::with_min_lifetime(inner, TimeDelta::hours(DEFAULT_MIN_KEY_LIFETIME_HOURS))
    }

    /// 再取得時に要求する有効期間の下限を指定してラップする（7日で頭打ち）。
    pub fn with_min_lifetime(inner: P, min_lifetime: TimeDelta) -> Self {
        Self {
            inner,
            min_lifetime: min_lifetime.min(TimeDelta::days(MAX_KEY_LIFETIME_DAYS)),
            cached: RwLock::new(None),
        }
    }

    fn lookup(
        cached: &Option<UserDelegationKey>,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Option<UserDelegationKey> {
        cached.as_ref().filter(|k| k.covers(start, expiry)).cloned()
    }
}

#[async_trait::async_trait]
impl<P: DelegationKeyProvider> DelegationKeyProvider for CachedDelegationKeyProvider<P> {
    async fn delegation_key(
        &self,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<UserDelegationKey, GatewayError> {
        if let Some(key) = Self::lookup(&*self.cached.read().await, start, expiry) {
            return Ok(key);
        }

        let mut cached = self.cached.write().await;
        // 待機中に他のリクエストが更新済みの場合
        if let Some(key) = Self::lookup(&cached, start, expiry) {
            return Ok(key);
        }

        let key_expiry = expiry.max(start + self.min_lifetime);
        let key = self.inner.delegation_key(start, key_expiry).await?;
        tracing::info!(
            signed_start = %key.signed_start,
            signed_expiry = %key.signed_expiry,
            "ユーザー委任キーを更新"
        );
        *cached = Some(key.clone());
        Ok(key)
    }
}
