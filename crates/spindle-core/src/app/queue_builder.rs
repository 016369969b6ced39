//! QueueBuilder - 反復を避けるシャッフルで publish 順を決める
//!
//! # アルゴリズム
//! 1. recency window の key を読む
//! 2. アセットプールを namespace で一覧（毎回取り直す）
//! 3. プールを fresh（window 外）と stale（window 内）に分ける
//! 4. fresh をシャッフルし、末尾から `min(len, recent_limit)` 個を先頭グループにする
//! 5. 残りの fresh と stale を混ぜてシャッフルし、後続にする
//! 6. 逆順に挿入（newest = 次に publish するもの）
//!
//! stale はプールとの積で求めるので、ストレージから消えた key は混入しません。

use std::collections::HashSet;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{Instrument, info};

use super::context::AgentContext;
use crate::domain::{AssetKey, QueueEntry, Record, RecentEntry, RunId, StoreError, Table};
use crate::error::SpindleError;

/// What one queue build did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueBuildReport {
    pub run_id: RunId,
    pub pool: usize,
    pub fresh: usize,
    pub stale: usize,
    pub enqueued: usize,
}

/// Arrange `pool` into publish order (first element is published first).
///
/// The first `min(|pool - recent|, recent_limit)` keys are drawn only from keys
/// outside `recent`. Duplicate pool keys are collapsed.
pub fn arrange_queue<R: Rng + ?Sized>(
    pool: &[AssetKey],
    recent: &HashSet<AssetKey>,
    recent_limit: usize,
    rng: &mut R,
) -> (Vec<AssetKey>, usize) {
    let mut seen = HashSet::with_capacity(pool.len());
    let (mut fresh, stale): (Vec<AssetKey>, Vec<AssetKey>) = pool
        .iter()
        .filter(|k| seen.insert(*k))
        .cloned()
        .partition(|k| !recent.contains(k));
    let stale_count = stale.len();

    fresh.shuffle(rng);
    let n = fresh.len().min(recent_limit);
    let mut front = fresh.split_off(fresh.len() - n);
    front.reverse();

    let mut tail = fresh;
    tail.extend(stale);
    tail.shuffle(rng);

    front.extend(tail);
    (front, stale_count)
}

pub struct QueueBuilder {
    ctx: AgentContext,
    namespace: String,
    recent_limit: usize,
    rng: Mutex<StdRng>,
}

impl QueueBuilder {
    pub fn new(ctx: AgentContext, namespace: impl Into<String>, recent_limit: usize) -> Self {
        Self {
            ctx,
            namespace: namespace.into(),
            recent_limit,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic shuffles, for tests and reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Extend the queue with a freshly arranged copy of the pool.
    pub async fn build(&self) -> Result<QueueBuildReport, SpindleError> {
        let run_id = RunId::generate();
        self.build_inner(run_id)
            .instrument(self.ctx.span("queue_builder", run_id))
            .await
    }

    async fn build_inner(&self, run_id: RunId) -> Result<QueueBuildReport, SpindleError> {
        let recent: HashSet<AssetKey> = self
            .ctx
            .store
            .scan_all(Table::Recent)
            .await?
            .into_iter()
            .map(|r| RecentEntry::try_from(r).map(|e| e.key))
            .collect::<Result<_, _>>()
            .map_err(StoreError::from)?;

        let pool = self.ctx.assets.list_keys(&self.namespace).await?;

        let (order, stale) = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            arrange_queue(&pool, &recent, self.recent_limit, &mut *rng)
        };

        let report = QueueBuildReport {
            run_id,
            pool: pool.len(),
            fresh: order.len() - stale,
            stale,
            enqueued: order.len(),
        };
        if order.is_empty() {
            info!(namespace = %self.namespace, "asset pool is empty, queue unchanged");
            return Ok(report);
        }

        let now = self.ctx.clock.now();
        let rows: Vec<Record> = order
            .into_iter()
            .rev()
            .map(|key| QueueEntry::new(key, now).into())
            .collect();
        self.ctx.store.append_all(rows).await?;

        info!(
            enqueued = report.enqueued,
            fresh = report.fresh,
            stale = report.stale,
            "queue built"
        );
        Ok(report)
    }
}
