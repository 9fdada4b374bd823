//! # Upload SAS 共有型定義
//!
//! `POST /upload/sas` のリクエスト・レスポンスをRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - JSONフィールド名はクライアント既存実装に合わせてcamelCase
//! - リクエスト側は欠落フィールドを空文字列として受け取り、検証層で拒否する

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /upload/sas
// ---------------------------------------------------------------------------

/// /upload/sas リクエスト。
///
/// 3フィールドとも `[A-Za-z0-9_.-]+` に一致する必要がある。
/// 欠落は空文字列として扱われ、400で拒否される。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSasRequest {
    /// セッションID（呼び出し側が払い出す不透明な識別子）
    #[serde(default)]
    pub sid: String,
    /// 成果物の役割を表すラベル（例: "invoice"）
    #[serde(default)]
    pub label: String,
    /// 元ファイル名（拡張子の抽出にのみ使用）
    #[serde(default)]
    pub filename: String,
}

/// /upload/sas レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSasResponse {
    /// 1オブジェクト限定・書き込み専用の署名付きURL
    pub upload_url: String,
    /// 導出されたBlob名（`{sid}_{label}{ext}`）
    pub blob_name: String,
    /// URLの有効期間（分）
    pub expires_in_minutes: u32,
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_missing_fields_default_to_empty() {
        let req: UploadSasRequest = serde_json::from_str(r#"{"sid":"s_1"}"#).unwrap();
        assert_eq!(req.sid, "s_1");
        assert!(req.label.is_empty());
        assert!(req.filename.is_empty());
    }

    #[test]
    fn test_response_uses_camel_case() {
        let resp = UploadSasResponse {
            upload_url: "https://acct.blob.core.windows.net/uploads/a_b.pdf?sig=x".to_string(),
            blob_name: "a_b.pdf".to_string(),
            expires_in_minutes: 10,
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["blobName"], "a_b.pdf");
        assert_eq!(value["expiresInMinutes"], 10);
        assert!(value["uploadUrl"].as_str().unwrap().starts_with("https://"));
        assert!(value.get("upload_url").is_none());
    }
}
