//! AssetSource port - Blob ストレージ上のアセットプール
//!
//! プールは永続化されません。queue build のたびに新しく一覧を取得します。
//!
//! # 実装
//! - `impls::LocalDirAssetSource`: ローカルディレクトリ（bucket = ルートディレクトリ）
//! - `impls::InMemoryAssetSource`: 開発・テスト用

use std::path::Path;

use async_trait::async_trait;

use crate::domain::{AssetKey, FetchError};

/// AssetSource は namespace 配下のアセットを一覧・取得する
///
/// `fetch` の失敗は `FetchError` の variant で分類され、publish pipeline は
/// variant ごとに別の扱いをします（NotFound / FolderMissing → 次の候補、
/// IsDirectory → ループ終了）。
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Keys of the files (never folders) currently stored under `namespace`.
    async fn list_keys(&self, namespace: &str) -> Result<Vec<AssetKey>, FetchError>;

    /// Copy the asset to `destination`. The parent folder must already exist.
    async fn fetch(&self, key: &AssetKey, destination: &Path) -> Result<(), FetchError>;
}
