//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **SqliteRecordStore**: 本番用の永続化ゲートウェイ
//! - **InMemoryRecordStore**: 開発・テスト用
//! - **LocalDirAssetSource**: ローカルディレクトリのアセットプール
//! - **InMemoryAssetSource**: テスト用のアセットプール
//! - **DryRunSocialClient**: ログを出すだけの SocialClient

pub mod dry_run_social;
pub mod local_assets;
pub mod memory_assets;
pub mod memory_store;
pub mod sqlite_store;

// 主要な型を再エクスポート
pub use self::dry_run_social::DryRunSocialClient;
pub use self::local_assets::LocalDirAssetSource;
pub use self::memory_assets::InMemoryAssetSource;
pub use self::memory_store::InMemoryRecordStore;
pub use self::sqlite_store::SqliteRecordStore;
