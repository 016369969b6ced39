//! Scheduler - コンポーネントごとの cadence ループ
//!
//! - 各コンポーネントは自分の interval で独立に動く（同時実行はしても再入はしない）
//! - tick を待つ間だけ shutdown と競合させる。実行中の invocation は止めない
//! - エラーはログに出して次の tick へ進む

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use super::builder::{Agent, GatedPublish};

/// Handle over the running cadence loops.
/// - `request_shutdown()` で全ループが次の tick 待ちで止まる
/// - `shutdown_and_join()` で全ループの終了を待てる
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn one loop per enabled component, on the intervals of `agent.config().schedule`.
    pub fn spawn(agent: Arc<Agent>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let schedule = &agent.config().schedule;
        let (queue_every, publish_every) = (schedule.queue_every(), schedule.publish_every());
        let (follow_back_every, unfollow_every) =
            (schedule.follow_back_every(), schedule.unfollow_every());
        let relationships = &agent.config().relationships;
        let mut joins = Vec::with_capacity(4);

        let a = Arc::clone(&agent);
        joins.push(tokio::spawn(cadence_loop(
            "queue_builder",
            queue_every,
            shutdown_rx.clone(),
            move || {
                let agent = Arc::clone(&a);
                async move { run_queue_builder(&agent).await }
            },
        )));

        let a = Arc::clone(&agent);
        let preload = agent.config().publish.preload;
        let rx = shutdown_rx.clone();
        joins.push(tokio::spawn(async move {
            if preload {
                run_queue_builder(&a).await;
            }
            cadence_loop("publish", publish_every, rx, move || {
                let agent = Arc::clone(&a);
                async move { run_publish(&agent).await }
            })
            .await;
        }));

        if relationships.follow_back_enabled {
            let a = Arc::clone(&agent);
            joins.push(tokio::spawn(cadence_loop(
                "follow_back",
                follow_back_every,
                shutdown_rx.clone(),
                move || {
                    let agent = Arc::clone(&a);
                    async move {
                        match agent.follow_back().await {
                            Ok(report) => {
                                debug!(followed = report.followed, "follow-back tick done")
                            }
                            Err(e) => error!(error = %e, "follow-back failed"),
                        }
                    }
                },
            )));
        }

        if relationships.unfollow_enabled {
            let a = Arc::clone(&agent);
            joins.push(tokio::spawn(cadence_loop(
                "unfollow",
                unfollow_every,
                shutdown_rx,
                move || {
                    let agent = Arc::clone(&a);
                    async move {
                        match agent.unfollow().await {
                            Ok(report) => {
                                debug!(unfollowed = report.unfollowed, "unfollow tick done")
                            }
                            Err(e) => error!(error = %e, "unfollow failed"),
                        }
                    }
                },
            )));
        }

        info!(loops = joins.len(), account = agent.account(), "scheduler started");
        Self { shutdown_tx, joins }
    }

    /// Ask every loop to stop before its next tick.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            if let Err(e) = j.await {
                error!(error = %e, "scheduler loop panicked");
            }
        }
    }
}

async fn run_queue_builder(agent: &Agent) {
    match agent.ensure_queue().await {
        Ok(Some(report)) => debug!(enqueued = report.enqueued, "queue refilled"),
        Ok(None) => {}
        Err(e) => error!(error = %e, "queue build failed"),
    }
}

async fn run_publish(agent: &Agent) {
    match agent.publish_if_allowed().await {
        Ok(GatedPublish::NotAllowed) => debug!("publish gate closed"),
        Ok(GatedPublish::Ran { report }) => {
            debug!(published = report.is_published(), "publish tick done")
        }
        Err(e) => error!(error = %e, "publish failed"),
    }
}

async fn cadence_loop<F, Fut>(
    component: &'static str,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    mut run: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender dropped: nobody can stop us any more, so stop now
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        run().await;
    }
    debug!(component, "cadence loop stopped");
}
