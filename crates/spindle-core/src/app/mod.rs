//! App - アプリケーション層
//!
//! ports を組み合わせて 3 つのコンポーネントを実装します。
//! コンポーネント同士は RecordStore だけを介して通信します。
//!
//! # 主要コンポーネント
//! - **QueueBuilder**: 反復を避けるシャッフルで publish キューを作る
//! - **PublishPipeline**: キューを 1 件消費して投稿し、recency window を保つ
//! - **RelationshipTracker**: フォローバックとアンフォロー
//! - **AgentBuilder / Agent**: ワイヤリングと 1 回ごとの起動
//! - **Scheduler**: コンポーネントごとの cadence ループ

pub mod builder;
pub mod context;
pub mod publish;
pub mod queue_builder;
pub mod relationships;
pub mod scheduler;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{Agent, AgentBuilder, BuildError, GatedPublish};
pub use self::context::AgentContext;
pub use self::publish::{PublishPipeline, PublishReport, PublishSettings};
pub use self::queue_builder::{QueueBuildReport, QueueBuilder, arrange_queue};
pub use self::relationships::{
    FollowBackReport, RelationshipSettings, RelationshipTracker, UnfollowReport,
};
pub use self::scheduler::Scheduler;
pub use self::status::AgentStatus;
