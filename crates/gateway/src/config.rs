//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 設定は起動時に一度だけ読み込み、以降は不変値として明示的に渡す。

use anyhow::{bail, Context};
use url::Url;

use crate::issuer::SasIssuer;

/// コンテナ名のデフォルト値
pub const DEFAULT_CONTAINER: &str = "uploads";
/// SAS有効期間（分）のデフォルト値
pub const DEFAULT_TTL_MINUTES: u32 = 10;
/// SAS有効期間の上限（分）。ユーザー委任キーの最大有効期間（7日）に合わせる。
pub const MAX_TTL_MINUTES: u32 = 7 * 24 * 60;
/// 待ち受けアドレスのデフォルト値
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Gateway設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// ストレージアカウント名（`STORAGE_ACCOUNT_NAME`、必須）
    pub account_name: String,
    /// アップロード先コンテナ名（`UPLOADS_CONTAINER`）
    pub container: String,
    /// 署名付きURLの有効期間（分）（`SAS_TTL_MINUTES`）
    pub ttl_minutes: u32,
    /// Blobサービスのエンドポイント（`BLOB_ENDPOINT`）。
    /// 未設定時は `https://{account}.blob.core.windows.net`。
    pub blob_endpoint: Url,
    /// 待ち受けアドレス（`BIND_ADDR`）
    pub bind_addr: String,
}

impl GatewayConfig {
    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から構築する。
    ///
    /// 空文字列の値は未設定として扱う。
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let account_name = get("STORAGE_ACCOUNT_NAME")
            .context("STORAGE_ACCOUNT_NAMEが設定されていません")?;
        if !is_valid_account_name(&account_name) {
            bail!("STORAGE_ACCOUNT_NAMEが不正です: {account_name}");
        }

        let container = get("UPLOADS_CONTAINER").unwrap_or_else(|| DEFAULT_CONTAINER.to_string());
        if !is_valid_container_name(&container) {
            bail!("UPLOADS_CONTAINERが不正です: {container}");
        }

        let ttl_minutes = match get("SAS_TTL_MINUTES") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("SAS_TTL_MINUTESは整数である必要があります: {raw}"))?,
            None => DEFAULT_TTL_MINUTES,
        };
        if ttl_minutes == 0 || ttl_minutes > MAX_TTL_MINUTES {
            bail!("SAS_TTL_MINUTESは1〜{MAX_TTL_MINUTES}の範囲で指定してください: {ttl_minutes}");
        }

        let endpoint = get("BLOB_ENDPOINT")
            .unwrap_or_else(|| format!("https://{account_name}.blob.core.windows.net"));
        let blob_endpoint = Url::parse(&endpoint)
            .with_context(|| format!("BLOB_ENDPOINTが不正なURLです: {endpoint}"))?;
        if blob_endpoint.cannot_be_a_base() {
            bail!("BLOB_ENDPOINTはベースURLである必要があります: {endpoint}");
        }

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        Ok(Self {
            account_name,
            container,
            ttl_minutes,
            blob_endpoint,
            bind_addr,
        })
    }
}

/// ストレージアカウント名の形式（3〜24文字の英小文字・数字）
fn is_valid_account_name(name: &str) -> bool {
    (3..=24).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// コンテナ名の形式（3〜63文字、英小文字・数字・ハイフン、先頭末尾はハイフン不可）
fn is_valid_container_name(name: &str) -> bool {
    (3..=63).contains(&name.len())
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// SAS発行器
    pub issuer: SasIssuer,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[("STORAGE_ACCOUNT_NAME", "acct01")]))
            .unwrap();
        assert_eq!(config.account_name, "acct01");
        assert_eq!(config.container, "uploads");
        assert_eq!(config.ttl_minutes, 10);
        assert_eq!(
            config.blob_endpoint.as_str(),
            "https://acct01.blob.core.windows.net/"
        );
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_missing_account_is_fatal() {
        assert!(GatewayConfig::from_lookup(lookup(&[])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("STORAGE_ACCOUNT_NAME", "  ")])).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("STORAGE_ACCOUNT_NAME", "devstoreaccount1"),
            ("UPLOADS_CONTAINER", "evidence-in"),
            ("SAS_TTL_MINUTES", "30"),
            ("BLOB_ENDPOINT", "http://127.0.0.1:10000/devstoreaccount1"),
            ("BIND_ADDR", "127.0.0.1:8080"),
        ]))
        .unwrap();
        assert_eq!(config.container, "evidence-in");
        assert_eq!(config.ttl_minutes, 30);
        assert_eq!(config.blob_endpoint.host_str(), Some("127.0.0.1"));
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        for (key, value) in [
            ("SAS_TTL_MINUTES", "ten"),
            ("SAS_TTL_MINUTES", "0"),
            ("SAS_TTL_MINUTES", "20000"),
            ("UPLOADS_CONTAINER", "Uploads"),
            ("UPLOADS_CONTAINER", "up/loads"),
            ("BLOB_ENDPOINT", "not a url"),
        ] {
            let result = GatewayConfig::from_lookup(lookup(&[
                ("STORAGE_ACCOUNT_NAME", "acct01"),
                (key, value),
            ]));
            assert!(result.is_err(), "{key}={value} が受理されてしまった");
        }
        assert!(GatewayConfig::from_lookup(lookup(&[("STORAGE_ACCOUNT_NAME", "Acct_01")])).is_err());
    }
}
