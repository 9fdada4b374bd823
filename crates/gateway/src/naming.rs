//! # 入力検証とBlob名導出
//!
//! 呼び出し側から受け取る3フィールドを `[A-Za-z0-9_.-]+` に制限し、
//! そこから決定的にBlob名を導出する。
//! 許可文字以外（パス区切り・空白・制御文字）を全て拒否することで、
//! 導出されたBlob名がコンテナ外を指すことはない。

use upload_sas_types::UploadSasRequest;

use crate::error::GatewayError;

/// 拡張子を持たないファイル名に付与する既定の拡張子
pub const DEFAULT_EXTENSION: &str = ".pdf";

/// 検証済みのアップロード要求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// セッションID
    pub session_id: String,
    /// ラベル
    pub label: String,
    /// 元ファイル名
    pub filename: String,
}

impl UploadRequest {
    /// ワイヤ形式のリクエストを検証する。
    ///
    /// 前後の空白は除去してから検証する。最初に見つかった不正フィールドで失敗する。
    pub fn validate(raw: &UploadSasRequest) -> Result<Self, GatewayError> {
        Ok(Self {
            session_id: safe_field(&raw.sid, "sid")?,
            label: safe_field(&raw.label, "label")?,
            filename: safe_field(&raw.filename, "filename")?,
        })
    }

    /// この要求のBlob名。
    pub fn object_key(&self) -> String {
        derive_object_key(&self.session_id, &self.label, &self.filename)
    }
}

/// 1フィールドを検証し、前後の空白を除いた値を返す。
fn safe_field(value: &str, field: &str) -> Result<String, GatewayError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::BadRequest(format!("{field} が指定されていません")));
    }
    if !trimmed.chars().all(is_safe_char) {
        return Err(GatewayError::BadRequest(format!(
            "{field} に使用できない文字が含まれています（許可: A-Z a-z 0-9 _ . -）"
        )));
    }
    Ok(trimmed.to_string())
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// ファイル名の拡張子（最後の `.` 以降、`.` を含む、小文字化）。
/// `.` を含まない場合は `.pdf`。
pub fn extension_of(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) => filename[idx..].to_ascii_lowercase(),
        None => DEFAULT_EXTENSION.to_string(),
    }
}

/// Blob名を導出する: `{session_id}_{label}{extension}`。
///
/// 純粋関数。同じ入力からは常に同じ名前が得られ、衝突回避は行わない。
pub fn derive_object_key(session_id: &str, label: &str, filename: &str) -> String {
    format!("{session_id}_{label}{}", extension_of(filename))
}
