//! Status - エージェントの状態スナップショット
//!
//! 運用者が「なぜ投稿されないか」を確認するためのビュー。
//! 値はすべて store から読み直します。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::builder::Agent;
use crate::domain::{AssetKey, QueueEntry, StoreError, Table};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub account: String,
    pub queue_depth: usize,
    /// Entry the next publish will try first.
    pub next_key: Option<AssetKey>,
    pub recent_window: usize,
    pub recent_limit: usize,
    pub relationship_requests: usize,
    pub last_published_at: Option<DateTime<Utc>>,
    pub can_publish: bool,
}

impl Agent {
    pub async fn status(&self) -> Result<AgentStatus, StoreError> {
        let ctx = self.context();
        let store = &ctx.store;

        let next_key = match store.newest(Table::Queue).await? {
            Some(record) => Some(QueueEntry::try_from(record)?.key),
            None => None,
        };

        Ok(AgentStatus {
            account: self.account().to_string(),
            queue_depth: store.count(Table::Queue).await?,
            next_key,
            recent_window: store.count(Table::Recent).await?,
            recent_limit: self.config().publish.recent_limit,
            relationship_requests: store.count(Table::RelationshipRequests).await?,
            last_published_at: store.newest_timestamp(Table::Recent).await?,
            can_publish: self.publisher().can_publish(ctx.clock.now()).await?,
        })
    }
}
