//! PublishPipeline - queue の newest を取得・投稿し、recency window に記録
//!
//! # フロー
//! 1. `download_latest`: newest の QueueEntry をローカルに取得（候補を替えながら最大 N 回）
//! 2. queue から削除（publish の前。クラッシュしても二重投稿しない）
//! 3. `publish_asset`: upload → post（最大 N 回、handle 取得後は再試行しない）
//! 4. 結果に関わらず RecentEntry を記録し、window を `recent_limit` まで縮める
//!
//! # 二重投稿の回避
//! 取りこぼし（missed post）は許容し、二重投稿は避けます。
//! media handle を得た後の失敗は再試行しません。

use std::convert::Infallible;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::{Instrument, debug, info, warn};

use super::context::AgentContext;
use crate::config::PublishConfig;
use crate::domain::{
    AssetKey, FetchError, Outcome, PlatformError, QueueEntry, RecentEntry, RunId, StoreError,
    Table,
};
use crate::retry::{Attempted, run_bounded};

/// Publish settings, taken from `[publish]` and `[assets]`.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub tweet_enabled: bool,
    pub recent_limit: usize,
    pub tweet_timeout: Duration,
    pub max_download_attempts: u32,
    pub max_tweet_attempts: u32,
    /// A key `k` is staged at `download_dir/k`.
    pub download_dir: PathBuf,
}

impl PublishSettings {
    pub fn from_config(publish: &PublishConfig, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            tweet_enabled: publish.tweet_enabled,
            recent_limit: publish.recent_limit,
            tweet_timeout: publish.tweet_timeout(),
            max_download_attempts: publish.max_download_attempts,
            max_tweet_attempts: publish.max_tweet_attempts,
            download_dir: download_dir.into(),
        }
    }
}

/// A queue entry whose asset is available locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub entry: QueueEntry,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishReport {
    /// No queue entry could be made available locally.
    Skipped { run_id: RunId },

    Published {
        run_id: RunId,
        key: AssetKey,
        attempts: u32,
        evicted: usize,
    },

    /// The entry was consumed without a confirmed post.
    Failed {
        run_id: RunId,
        key: AssetKey,
        attempts: u32,
        reason: String,
        evicted: usize,
    },
}

impl PublishReport {
    pub fn key(&self) -> Option<&AssetKey> {
        match self {
            PublishReport::Skipped { .. } => None,
            PublishReport::Published { key, .. } | PublishReport::Failed { key, .. } => Some(key),
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, PublishReport::Published { .. })
    }
}

pub struct PublishPipeline {
    ctx: AgentContext,
    settings: PublishSettings,
}

/// Staging path of `key`, or `None` when the key is not a plain relative path.
fn staging_path(download_dir: &Path, key: &AssetKey) -> Option<PathBuf> {
    let relative = Path::new(key.as_str());
    let plain = !key.as_str().is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    plain.then(|| download_dir.join(relative))
}

/// Classify a failed upload or post.
///
/// Rate limits and unencodable payloads end the loop. Anything else is retried
/// only while no media handle exists, so a post is never sent twice.
fn classify_platform_error(err: &PlatformError, uploaded: bool) -> Outcome<()> {
    match err {
        PlatformError::RateLimited | PlatformError::Encoding(_) => Outcome::terminal(err.to_string()),
        _ if uploaded => Outcome::terminal(format!("{err} (after media upload)")),
        _ => Outcome::retryable(err.to_string()),
    }
}

impl PublishPipeline {
    pub fn new(ctx: AgentContext, settings: PublishSettings) -> Self {
        Self { ctx, settings }
    }

    pub fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    /// Enabled, something queued, and the last publish is older than `tweet_timeout`.
    ///
    /// With no recency record the last publish counts as the epoch.
    pub async fn can_publish(&self, now: DateTime<Utc>) -> Result<bool, StoreError> {
        if !self.settings.tweet_enabled {
            return Ok(false);
        }
        if self.ctx.store.count(Table::Queue).await? == 0 {
            return Ok(false);
        }
        let last = self
            .ctx
            .store
            .newest_timestamp(Table::Recent)
            .await?
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Ok(matches!((now - last).to_std(), Ok(elapsed) if elapsed > self.settings.tweet_timeout))
    }

    /// Make the newest queue entry available locally, dropping entries that cannot be.
    ///
    /// Returns `None` when the queue is empty, the attempts run out, or a key
    /// names a folder.
    pub async fn download_latest(&self) -> Result<Option<Downloaded>, StoreError> {
        let attempted = run_bounded(self.settings.max_download_attempts, |attempt| {
            self.try_download(attempt)
        })
        .await?;

        match attempted {
            Attempted::Succeeded { value, .. } => Ok(Some(value)),
            Attempted::Exhausted { attempts, last_reason } => {
                warn!(
                    attempts,
                    reason = last_reason.as_deref().unwrap_or(""),
                    "no queue entry could be downloaded"
                );
                Ok(None)
            }
            Attempted::Stopped { reason, .. } => {
                info!(%reason, "download loop stopped");
                Ok(None)
            }
        }
    }

    async fn try_download(&self, attempt: u32) -> Result<Outcome<Downloaded>, StoreError> {
        let store = &self.ctx.store;
        let Some(record) = store.newest(Table::Queue).await? else {
            return Ok(Outcome::terminal("queue is empty"));
        };
        let entry = QueueEntry::try_from(record)?;

        let Some(path) = staging_path(&self.settings.download_dir, &entry.key) else {
            warn!(key = %entry.key, "malformed queue key, dropping entry");
            store.delete(Table::Queue, entry.key.as_str()).await?;
            return Ok(Outcome::retryable(format!("malformed key {}", entry.key)));
        };

        if fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            debug!(key = %entry.key, "asset already staged, skipping download");
            return Ok(Outcome::Success(Downloaded { entry, path }));
        }
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                warn!(dir = %parent.display(), error = %e, "could not create staging folder");
            }
        }

        debug!(attempt, key = %entry.key, "downloading asset");
        match self.ctx.assets.fetch(&entry.key, &path).await {
            Ok(()) => Ok(Outcome::Success(Downloaded { entry, path })),
            Err(FetchError::FolderMissing(dir)) => {
                warn!(key = %entry.key, dir = %dir.display(), "destination folder does not exist, dropping entry");
                if let Err(e) = fs::create_dir_all(&dir).await {
                    warn!(dir = %dir.display(), error = %e, "could not create staging folder");
                }
                store.delete(Table::Queue, entry.key.as_str()).await?;
                Ok(Outcome::retryable(format!("folder {} missing", dir.display())))
            }
            Err(err @ FetchError::NotFound(_)) => {
                warn!(key = %entry.key, "asset no longer exists in the bucket, dropping entry");
                store.delete(Table::Queue, entry.key.as_str()).await?;
                Ok(Outcome::retryable(err.to_string()))
            }
            Err(err @ FetchError::IsDirectory(_)) => {
                warn!(key = %entry.key, error = %err, "dropping entry and stopping downloads");
                store.delete(Table::Queue, entry.key.as_str()).await?;
                Ok(Outcome::terminal(err.to_string()))
            }
            Err(err @ FetchError::Io(_)) => {
                warn!(key = %entry.key, error = %err, "download failed, will retry");
                Ok(Outcome::retryable(err.to_string()))
            }
        }
    }

    /// Upload `path` and post it with `comment`.
    pub async fn publish_asset(&self, path: &Path, comment: &str) -> Attempted<()> {
        let social = self.ctx.social.as_ref();

        let max_attempts = self.settings.max_tweet_attempts;
        let attempted = run_bounded::<_, Infallible, _, _>(max_attempts, |attempt| async move {
            let handle = match social.upload_media(path).await {
                Ok(handle) => handle,
                Err(e) => {
                    let outcome = classify_platform_error(&e, false);
                    warn!(
                        attempt,
                        error = %e,
                        status = ?e.status(),
                        outcome = ?outcome.kind(),
                        "media upload failed"
                    );
                    return Ok(outcome);
                }
            };

            let posted = social
                .create_post(comment, std::slice::from_ref(&handle))
                .await;
            Ok(match posted {
                Ok(()) => Outcome::Success(()),
                Err(e) => {
                    let outcome = classify_platform_error(&e, true);
                    warn!(
                        attempt,
                        error = %e,
                        status = ?e.status(),
                        outcome = ?outcome.kind(),
                        "post failed"
                    );
                    outcome
                }
            })
        })
        .await;

        attempted.unwrap_or_else(|never| match never {})
    }

    /// One publish cycle. Only persistence failures are returned as errors.
    pub async fn publish(&self) -> Result<PublishReport, StoreError> {
        let run_id = RunId::generate();
        self.publish_inner(run_id)
            .instrument(self.ctx.span("publish", run_id))
            .await
    }

    async fn publish_inner(&self, run_id: RunId) -> Result<PublishReport, StoreError> {
        let Some(Downloaded { entry, path }) = self.download_latest().await? else {
            return Ok(PublishReport::Skipped { run_id });
        };
        let store = &self.ctx.store;

        store.delete(Table::Queue, entry.key.as_str()).await?;

        let attempted = self.publish_asset(&path, entry.caption()).await;

        // consumed either way, so it is not offered again too soon
        store
            .append(RecentEntry::new(entry.key.clone(), self.ctx.clock.now()).into())
            .await?;
        let evicted = self.evict_recent().await?;

        Ok(match attempted {
            Attempted::Succeeded { attempts, .. } => {
                info!(key = %entry.key, attempts, "published");
                PublishReport::Published {
                    run_id,
                    key: entry.key,
                    attempts,
                    evicted,
                }
            }
            other => {
                let reason = other.failure_reason().unwrap_or("").to_string();
                warn!(key = %entry.key, attempts = other.attempts(), %reason, "publish failed, entry consumed");
                PublishReport::Failed {
                    run_id,
                    key: entry.key,
                    attempts: other.attempts(),
                    reason,
                    evicted,
                }
            }
        })
    }

    /// Delete the oldest recency rows until at most `recent_limit` remain.
    async fn evict_recent(&self) -> Result<usize, StoreError> {
        let store = &self.ctx.store;
        let count = store.count(Table::Recent).await?;
        let excess = count.saturating_sub(self.settings.recent_limit);
        for _ in 0..excess {
            store.delete_oldest(Table::Recent).await?;
        }
        if excess > 0 {
            debug!(evicted = excess, "recency window trimmed");
        }
        Ok(excess)
    }
}
