//! # 署名付きURL（SAS）
//!
//! 「アカウント + コンテナ + Blob + 権限 + 期間」から署名付きURLを得る処理を抽象化する。
//! 実際の署名方式はストレージプラットフォームが定めるものをそのまま実装する。

pub mod blob;

pub use blob::UserDelegationSasSigner;

use chrono::{DateTime, Utc};
use url::Url;

use crate::delegation::UserDelegationKey;
use crate::error::GatewayError;

/// アップロード用SASの権限。
///
/// 追加・作成・書き込みのみを表現でき、読み取り・削除・一覧は型として存在しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPermissions {
    /// a
    pub add: bool,
    /// c
    pub create: bool,
    /// w
    pub write: bool,
}

impl UploadPermissions {
    /// 追加・作成・書き込み
    pub const WRITE_CREATE_ADD: Self = Self {
        add: true,
        create: true,
        write: true,
    };

    /// `sp` パラメータ表記。サービス既定の順序（r a c w d …）に従う。
    pub fn as_sp(&self) -> String {
        let mut sp = String::with_capacity(3);
        if self.add {
            sp.push('a');
        }
        if self.create {
            sp.push('c');
        }
        if self.write {
            sp.push('w');
        }
        sp
    }
}

/// 1Blobに対するSAS生成要求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasRequest {
    /// コンテナ名
    pub container: String,
    /// Blob名
    pub blob_name: String,
    /// 権限
    pub permissions: UploadPermissions,
    /// 有効開始時刻（st）
    pub start: DateTime<Utc>,
    /// 有効期限（se）
    pub expiry: DateTime<Utc>,
}

/// 委任キーで1Blob限定のSAS URLを生成するトレイト。
pub trait BlobSasSigner: Send + Sync {
    /// 署名付きURLを生成する。
    fn sign(&self, request: &SasRequest, key: &UserDelegationKey) -> Result<Url, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_create_add_encoding() {
        assert_eq!(UploadPermissions::WRITE_CREATE_ADD.as_sp(), "acw");
    }

    #[test]
    fn test_partial_permissions_keep_order() {
        let only_write = UploadPermissions {
            add: false,
            create: false,
            write: true,
        };
        assert_eq!(only_write.as_sp(), "w");
        let create_write = UploadPermissions {
            add: false,
            create: true,
            write: true,
        };
        assert_eq!(create_write.as_sp(), "cw");
    }
}
