//! # テスト用共通ヘルパー
//!
//! モックHTTPサーバーと、外部機能トレイトの決定的なフェイク実装。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use url::Url;

use crate::config::GatewayConfig;
use crate::delegation::{DelegationKeyProvider, UserDelegationKey};
use crate::error::GatewayError;
use crate::identity::{AccessToken, TokenCredential};
use crate::sas::{BlobSasSigner, SasRequest};

/// テスト用モックHTTPサーバーを起動し、ポート番号を返す。
pub async fn start_mock_server(app: axum::Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    port
}

/// 既定値のテスト用設定（アカウント `acct01`、コンテナ `uploads`、10分）。
pub fn test_config() -> GatewayConfig {
    GatewayConfig::from_lookup(|key| match key {
        "STORAGE_ACCOUNT_NAME" => Some("acct01".to_string()),
        _ => None,
    })
    .unwrap()
}

/// 固定トークンを返す（または常に失敗する）資格情報。
pub struct StaticTokenCredential {
    token: Option<String>,
}

impl StaticTokenCredential {
    pub fn new(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { token: None }
    }
}

#[async_trait::async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken, GatewayError> {
        match &self.token {
            Some(token) => Ok(AccessToken {
                token: token.clone(),
                expires_at: Utc::now() + TimeDelta::hours(1),
            }),
            None => Err(GatewayError::Credential(
                "identity endpoint unreachable: connection refused (10.0.0.1:443)".to_string(),
            )),
        }
    }
}

/// 要求された期間ちょうどの固定キーを返すフェイク。呼び出し回数を記録する。
pub struct FakeDelegationKeyProvider {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl FakeDelegationKeyProvider {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
        }
    }

    /// 呼び出し回数カウンタ
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait::async_trait]
impl DelegationKeyProvider for FakeDelegationKeyProvider {
    async fn delegation_key(
        &self,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<UserDelegationKey, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GatewayError::Credential(
                "identity endpoint unreachable: connection refused (10.0.0.1:443)".to_string(),
            ));
        }
        Ok(UserDelegationKey {
            signed_oid: "00000000-0000-0000-0000-00000000000a".to_string(),
            signed_tid: "00000000-0000-0000-0000-00000000000b".to_string(),
            signed_start: start,
            signed_expiry: expiry,
            signed_service: "b".to_string(),
            signed_version: "2022-11-02".to_string(),
            value: base64::engine::general_purpose::STANDARD.encode(b"fake-delegation-key"),
        })
    }
}

/// 受け取った要求を記録する署名器。
pub struct RecordingSigner {
    recorded: Arc<Mutex<Vec<SasRequest>>>,
}

impl RecordingSigner {
    pub fn new() -> Self {
        Self {
            recorded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn recorded(&self) -> Arc<Mutex<Vec<SasRequest>>> {
        self.recorded.clone()
    }
}

impl BlobSasSigner for RecordingSigner {
    fn sign(&self, request: &SasRequest, _key: &UserDelegationKey) -> Result<Url, GatewayError> {
        self.recorded.lock().unwrap().push(request.clone());
        let mut url = Url::parse("https://recorder.invalid/").unwrap();
        url.path_segments_mut()
            .unwrap()
            .pop_if_empty()
            .push(&request.container)
            .push(&request.blob_name);
        Ok(url)
    }
}
