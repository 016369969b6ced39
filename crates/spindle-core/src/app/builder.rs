//! AgentBuilder - エージェントの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 必須の port（store, assets, social）が揃っていなければ `BuildError`
//! - 設定は build() 時に検証する（テーブル名の識別子チェックを含む）
//! - Clock は省略時 SystemClock

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::context::AgentContext;
use super::publish::{PublishPipeline, PublishReport, PublishSettings};
use super::queue_builder::{QueueBuildReport, QueueBuilder};
use super::relationships::{FollowBackReport, RelationshipTracker, UnfollowReport};
use crate::config::{ConfigError, SpindleConfig};
use crate::domain::{StoreError, Table};
use crate::error::SpindleError;
use crate::ports::{AssetSource, Clock, RecordStore, SocialClient, SystemClock};

/// AgentBuilder は Agent を構築
///
/// # 使用例
/// ```ignore
/// let agent = AgentBuilder::new(config)
///     .store(Arc::new(store))
///     .assets(Arc::new(LocalDirAssetSource::new(&config.assets.bucket)))
///     .social(Arc::new(DryRunSocialClient::new()))
///     .build()?;
/// ```
pub struct AgentBuilder {
    config: SpindleConfig,
    store: Option<Arc<dyn RecordStore>>,
    assets: Option<Arc<dyn AssetSource>>,
    social: Option<Arc<dyn SocialClient>>,
    clock: Option<Arc<dyn Clock>>,
    seed: Option<u64>,
}

/// BuildError はエージェント構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing port: {0}. It must be provided before build().")]
    MissingPort(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AgentBuilder {
    pub fn new(config: SpindleConfig) -> Self {
        Self {
            config,
            store: None,
            assets: None,
            social: None,
            clock: None,
            seed: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn assets(mut self, assets: Arc<dyn AssetSource>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn social(mut self, social: Arc<dyn SocialClient>) -> Self {
        self.social = Some(social);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Seed the queue shuffles.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<Agent, BuildError> {
        self.config.validate()?;

        let ctx = AgentContext {
            account: Arc::from(self.config.account.screen_name.as_str()),
            store: self.store.ok_or(BuildError::MissingPort("store"))?,
            assets: self.assets.ok_or(BuildError::MissingPort("assets"))?,
            social: self.social.ok_or(BuildError::MissingPort("social"))?,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        let mut queue_builder = QueueBuilder::new(
            ctx.clone(),
            self.config.assets.namespace.clone(),
            self.config.publish.recent_limit,
        );
        if let Some(seed) = self.seed {
            queue_builder = queue_builder.with_seed(seed);
        }
        let publisher = PublishPipeline::new(
            ctx.clone(),
            PublishSettings::from_config(&self.config.publish, &self.config.assets.download_dir),
        );
        let relationships =
            RelationshipTracker::new(ctx.clone(), (&self.config.relationships).into());

        Ok(Agent {
            ctx,
            config: self.config,
            queue_builder,
            publisher,
            relationships,
        })
    }
}

/// Agent は 1 アカウント分の 3 コンポーネントを束ねる
///
/// 各メソッドは 1 回の起動（invocation）に対応し、状態はすべて store から読み直す。
pub struct Agent {
    ctx: AgentContext,
    config: SpindleConfig,
    queue_builder: QueueBuilder,
    publisher: PublishPipeline,
    relationships: RelationshipTracker,
}

/// Result of a gated publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum GatedPublish {
    NotAllowed,
    Ran { report: PublishReport },
}

impl Agent {
    pub fn config(&self) -> &SpindleConfig {
        &self.config
    }

    pub fn account(&self) -> &str {
        &self.ctx.account
    }

    pub(crate) fn context(&self) -> &AgentContext {
        &self.ctx
    }

    pub fn publisher(&self) -> &PublishPipeline {
        &self.publisher
    }

    pub async fn build_queue(&self) -> Result<QueueBuildReport, SpindleError> {
        self.queue_builder.build().await
    }

    /// Build a queue only when the current one is used up.
    pub async fn ensure_queue(&self) -> Result<Option<QueueBuildReport>, SpindleError> {
        if self.ctx.store.count(Table::Queue).await? > 0 {
            return Ok(None);
        }
        info!(account = %self.ctx.account, "queue is empty, rebuilding");
        self.build_queue().await.map(Some)
    }

    /// Publish once without consulting the gate.
    pub async fn publish(&self) -> Result<PublishReport, StoreError> {
        self.publisher.publish().await
    }

    /// Publish once if `can_publish(now)` holds.
    pub async fn publish_if_allowed(&self) -> Result<GatedPublish, StoreError> {
        if !self.publisher.can_publish(self.ctx.clock.now()).await? {
            return Ok(GatedPublish::NotAllowed);
        }
        let report = self.publisher.publish().await?;
        Ok(GatedPublish::Ran { report })
    }

    pub async fn follow_back(&self) -> Result<FollowBackReport, StoreError> {
        self.relationships.follow_back().await
    }

    pub async fn unfollow(&self) -> Result<UnfollowReport, StoreError> {
        self.relationships.unfollow().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    fn config(download_dir: &std::path::Path) -> SpindleConfig {
        let mut config = SpindleConfig::default();
        config.account.screen_name = "spindle_test".into();
        config.publish.recent_limit = 2;
        config.assets.download_dir = download_dir.to_path_buf();
        config
    }

    fn wired(h: &Harness, config: SpindleConfig) -> AgentBuilder {
        AgentBuilder::new(config)
            .store(h.store.clone())
            .assets(h.assets.clone())
            .social(h.social.clone())
            .clock(h.clock.clone())
    }

    #[test]
    fn build_success() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new();
        let agent = wired(&h, config(dir.path())).build().unwrap();
        assert_eq!(agent.account(), "spindle_test");
    }

    #[test]
    fn build_missing_port() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new();
        let result = AgentBuilder::new(config(dir.path()))
            .store(h.store.clone())
            .social(h.social.clone())
            .build();
        assert!(matches!(result, Err(BuildError::MissingPort("assets"))));
    }

    #[test]
    fn build_rejects_invalid_config() {
        let h = Harness::new();
        let result = wired(&h, SpindleConfig::default()).build();
        assert!(matches!(result, Err(BuildError::Config(_))));
    }

    #[tokio::test]
    async fn gated_publish_respects_can_publish() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new();
        h.assets.insert("a", b"a".to_vec());
        h.assets.insert("b", b"b".to_vec());
        let agent = wired(&h, config(dir.path())).seed(3).build().unwrap();

        assert_eq!(
            agent.publish_if_allowed().await.unwrap(),
            GatedPublish::NotAllowed
        );

        let built = agent.ensure_queue().await.unwrap().unwrap();
        assert_eq!(built.enqueued, 2);
        assert!(agent.ensure_queue().await.unwrap().is_none());

        let first = agent.publish_if_allowed().await.unwrap();
        assert!(matches!(first, GatedPublish::Ran { ref report } if report.is_published()));

        // the clock has not moved, so the timeout has not elapsed
        assert_eq!(
            agent.publish_if_allowed().await.unwrap(),
            GatedPublish::NotAllowed
        );
        assert!(agent.publish().await.unwrap().is_published());
        assert_eq!(h.social.created_posts().len(), 2);
    }
}
