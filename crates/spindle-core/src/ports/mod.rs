//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（DB, Blob storage, SNS platform）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - 永続化ゲートウェイが source of truth（正本）
//! - クライアントはグローバルに持たず、必要なコンポーネントに注入する

pub mod asset_source;
pub mod clock;
pub mod record_store;
pub mod social;

pub use self::asset_source::AssetSource;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::record_store::RecordStore;
pub use self::social::{IdPage, MAX_ID_PAGE_SIZE, MediaHandle, PeerProfile, SocialClient};
