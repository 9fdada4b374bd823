//! # SAS発行器
//!
//! 検証 → Blob名導出 → 委任キー取得 → URL構築 の一連の処理。
//! 各リクエストは独立しており、委任キーキャッシュ以外の共有状態を持たない。

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use upload_sas_types::UploadSasRequest;
use url::Url;

use crate::config::GatewayConfig;
use crate::delegation::DelegationKeyProvider;
use crate::error::GatewayError;
use crate::naming::UploadRequest;
use crate::sas::{BlobSasSigner, SasRequest, UploadPermissions};

/// 時刻ずれ許容のため開始時刻を前倒しする幅（分）
pub const CLOCK_SKEW_MINUTES: i64 = 1;

/// 発行結果。永続化しない。
#[derive(Debug, Clone)]
pub struct SignedUploadGrant {
    /// 1Blob限定・書き込み専用の署名付きURL
    pub upload_url: Url,
    /// 導出されたBlob名
    pub object_key: String,
    /// 設定された有効期間（分）
    pub expires_in_minutes: u32,
    /// URLの有効開始時刻
    pub starts_at: DateTime<Utc>,
    /// URLの有効期限
    pub expires_at: DateTime<Utc>,
}

/// SAS発行器。
pub struct SasIssuer {
    container: String,
    ttl_minutes: u32,
    delegation: Box<dyn DelegationKeyProvider>,
    signer: Box<dyn BlobSasSigner>,
}

impl SasIssuer {
    /// 設定と2つの外部機能から発行器を構築する。
    pub fn new(
        config: &GatewayConfig,
        delegation: Box<dyn DelegationKeyProvider>,
        signer: Box<dyn BlobSasSigner>,
    ) -> Self {
        Self {
            container: config.container.clone(),
            ttl_minutes: config.ttl_minutes,
            delegation,
            signer,
        }
    }

    /// 現在時刻でアップロード用SASを発行する。
    pub async fn issue_upload_grant(
        &self,
        raw: &UploadSasRequest,
    ) -> Result<SignedUploadGrant, GatewayError> {
        self.issue_upload_grant_at(raw, Utc::now()).await
    }

    /// 指定時刻を発行時刻としてアップロード用SASを発行する。
    ///
    /// 検証に失敗した場合、委任キーの取得は行わない。
    pub async fn issue_upload_grant_at(
        &self,
        raw: &UploadSasRequest,
        now: DateTime<Utc>,
    ) -> Result<SignedUploadGrant, GatewayError> {
        let request = UploadRequest::validate(raw)?;
        let object_key = request.object_key();

        // SASの時刻表記は秒精度
        let issued_at = now.trunc_subsecs(0);
        let starts_at = issued_at - TimeDelta::minutes(CLOCK_SKEW_MINUTES);
        let expires_at = issued_at + TimeDelta::minutes(i64::from(self.ttl_minutes));

        let key = self.delegation.delegation_key(starts_at, expires_at).await?;

        let upload_url = self.signer.sign(
            &SasRequest {
                container: self.container.clone(),
                blob_name: object_key.clone(),
                permissions: UploadPermissions::WRITE_CREATE_ADD,
                start: starts_at,
                expiry: expires_at,
            },
            &key,
        )?;

        tracing::info!(
            blob_name = %object_key,
            container = %self.container,
            ttl_minutes = self.ttl_minutes,
            starts_at = %starts_at,
            expires_at = %expires_at,
            "署名付きアップロードURLを発行"
        );

        Ok(SignedUploadGrant {
            upload_url,
            object_key,
            expires_in_minutes: self.ttl_minutes,
            starts_at,
            expires_at,
        })
    }
}
