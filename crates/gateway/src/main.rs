//! # Upload SAS Gateway
//!
//! 信頼できないクライアントが、ストレージ資格情報を見ることなく
//! Blob Storageへ1オブジェクトを直接アップロードするための署名付きURLを発行する。
//!
//! ## 役割
//! - 入力（sid / label / filename）の形式検証
//! - Blob名の決定的な導出（`{sid}_{label}{ext}`）
//! - マネージドID等によるユーザー委任キーの取得（キャッシュ付き）
//! - 1Blob限定・書き込み専用（a/c/w）・短命の署名付きURL生成
//!
//! ## API エンドポイント
//! - `POST /upload/sas` — 署名付きアップロードURL発行

mod config;
mod delegation;
mod endpoints;
mod error;
mod identity;
mod issuer;
mod naming;
mod sas;
#[cfg(test)]
mod test_helpers;

use std::sync::Arc;

use config::{GatewayConfig, GatewayState};
use delegation::{AzureDelegationKeyProvider, CachedDelegationKeyProvider};
use identity::DefaultCredentialChain;
use issuer::SasIssuer;
use sas::UserDelegationSasSigner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // 設定は起動時に一度だけ読み込む
    let config = GatewayConfig::from_env()?;
    tracing::info!(
        storage_account = %config.account_name,
        container = %config.container,
        ttl_minutes = config.ttl_minutes,
        blob_endpoint = %config.blob_endpoint,
        "設定を読み込みました"
    );

    let http_client = reqwest::Client::new();

    // 資格情報チェーン → 委任キー取得（キャッシュ付き）
    let credential = DefaultCredentialChain::from_env(http_client.clone());
    let delegation = CachedDelegationKeyProvider::new(AzureDelegationKeyProvider::new(
        http_client,
        config.blob_endpoint.clone(),
        Arc::new(credential),
    ));
    let signer = UserDelegationSasSigner::new(&config.account_name, config.blob_endpoint.clone());

    let state = Arc::new(GatewayState {
        issuer: SasIssuer::new(&config, Box::new(delegation), Box::new(signer)),
    });

    let app = endpoints::router(state);

    tracing::info!("Gatewayを {} で起動します", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
