//! RelationshipTracker - follow back と unfollow の照合
//!
//! # 重複排除
//! RelationshipRequest の存在だけが「送信済み」のシグナルです。
//! - follow 成功 / Forbidden（保留中・ブロック・凍結）→ 記録する
//! - レート制限などの一時的な失敗 → 記録しない（次回の実行で再試行）
//! - unfollow 成功 → 記録を削除（将来の再 follow を許可）
//!
//! # レート制限への配慮
//! id 一覧のページが上限サイズ（`MAX_ID_PAGE_SIZE`）に達したら、次のページの前に
//! `page_pause` だけ待ちます。1 回の unfollow は `unfollow_cap` 件で打ち切ります。

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use tracing::{Instrument, debug, info, warn};

use super::context::AgentContext;
use crate::config::RelationshipsConfig;
use crate::domain::{Outcome, PeerId, PlatformError, RelationshipRequest, RunId, StoreError, Table};
use crate::ports::{MAX_ID_PAGE_SIZE, PeerProfile};

#[derive(Debug, Clone)]
pub struct RelationshipSettings {
    pub follower_retrieve_limit: usize,
    pub unfollow_cap: usize,
    pub page_pause: Duration,
}

impl From<&RelationshipsConfig> for RelationshipSettings {
    fn from(config: &RelationshipsConfig) -> Self {
        Self {
            follower_retrieve_limit: config.follower_retrieve_limit,
            unfollow_cap: config.unfollow_cap,
            page_pause: config.page_pause(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowBackReport {
    pub run_id: RunId,
    pub listed: usize,
    pub already_requested: usize,
    pub followed: usize,
    /// Forbidden by the platform; recorded so they are not tried again.
    pub rejected: usize,
    /// Transient failures; tried again on a later run.
    pub deferred: usize,
    /// Why the follower listing itself failed, if it did.
    pub listing_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnfollowReport {
    pub run_id: RunId,
    pub followees: usize,
    pub followers: usize,
    pub not_following_back: usize,
    pub unfollowed: usize,
    pub failed: usize,
    /// Left for the next run once the cap was reached.
    pub deferred: usize,
    pub listing_error: Option<String>,
}

impl FollowBackReport {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            listed: 0,
            already_requested: 0,
            followed: 0,
            rejected: 0,
            deferred: 0,
            listing_error: None,
        }
    }
}

impl UnfollowReport {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            followees: 0,
            followers: 0,
            not_following_back: 0,
            unfollowed: 0,
            failed: 0,
            deferred: 0,
            listing_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdListing {
    Followees,
    Followers,
}

/// Follow outcome: success and forbidden are final, anything else is retried later.
fn follow_outcome(result: Result<(), PlatformError>) -> Outcome<()> {
    match result {
        Ok(()) => Outcome::Success(()),
        Err(e @ PlatformError::Forbidden(_)) => Outcome::terminal(e.to_string()),
        Err(e) => Outcome::retryable(e.to_string()),
    }
}

pub struct RelationshipTracker {
    ctx: AgentContext,
    settings: RelationshipSettings,
}

impl RelationshipTracker {
    pub fn new(ctx: AgentContext, settings: RelationshipSettings) -> Self {
        Self { ctx, settings }
    }

    /// Follow recent followers that were never sent a request.
    pub async fn follow_back(&self) -> Result<FollowBackReport, StoreError> {
        let run_id = RunId::generate();
        self.follow_back_inner(run_id)
            .instrument(self.ctx.span("follow_back", run_id))
            .await
    }

    async fn follow_back_inner(&self, run_id: RunId) -> Result<FollowBackReport, StoreError> {
        let mut report = FollowBackReport::new(run_id);

        let followers = match self
            .ctx
            .social
            .list_followers(self.settings.follower_retrieve_limit)
            .await
        {
            Ok(followers) => followers,
            Err(e) => {
                warn!(error = %e, "could not list followers");
                report.listing_error = Some(e.to_string());
                return Ok(report);
            }
        };
        report.listed = followers.len();

        for PeerProfile { id, handle } in followers {
            if self
                .ctx
                .store
                .exists(Table::RelationshipRequests, id.as_str())
                .await?
            {
                report.already_requested += 1;
                continue;
            }

            match follow_outcome(self.ctx.social.follow(&id).await) {
                Outcome::Success(()) => {
                    self.record_request(id, &handle).await?;
                    info!(peer = %handle, "follow request sent");
                    report.followed += 1;
                }
                Outcome::Terminal(reason) => {
                    self.record_request(id, &handle).await?;
                    warn!(peer = %handle, %reason, "follow rejected, not asking again");
                    report.rejected += 1;
                }
                Outcome::Retryable(reason) => {
                    warn!(peer = %handle, %reason, "could not follow, will retry on a later run");
                    report.deferred += 1;
                }
            }
        }

        info!(
            followed = report.followed,
            rejected = report.rejected,
            deferred = report.deferred,
            "follow back finished"
        );
        Ok(report)
    }

    async fn record_request(&self, peer_id: PeerId, handle: &str) -> Result<(), StoreError> {
        let request = RelationshipRequest::new(peer_id, handle, self.ctx.clock.now());
        self.ctx.store.append(request.into()).await
    }

    /// Unfollow accounts that no longer follow back, up to `unfollow_cap` per run.
    pub async fn unfollow(&self) -> Result<UnfollowReport, StoreError> {
        let run_id = RunId::generate();
        self.unfollow_inner(run_id)
            .instrument(self.ctx.span("unfollow", run_id))
            .await
    }

    async fn unfollow_inner(&self, run_id: RunId) -> Result<UnfollowReport, StoreError> {
        let mut report = UnfollowReport::new(run_id);

        let listed = async {
            let followees = self.collect_ids(IdListing::Followees).await?;
            let followers = self.collect_ids(IdListing::Followers).await?;
            Ok::<_, PlatformError>((followees, followers))
        };
        let (followees, followers) = match listed.await {
            Ok(lists) => lists,
            Err(e) => {
                warn!(error = %e, "could not list relationships");
                report.listing_error = Some(e.to_string());
                return Ok(report);
            }
        };
        report.followees = followees.len();
        report.followers = followers.len();

        let followers: HashSet<PeerId> = followers.into_iter().collect();
        let not_following_back: Vec<PeerId> = followees
            .into_iter()
            .filter(|id| !followers.contains(id))
            .collect();
        report.not_following_back = not_following_back.len();

        for (i, peer) in not_following_back.iter().enumerate() {
            if report.unfollowed >= self.settings.unfollow_cap {
                report.deferred = not_following_back.len() - i;
                info!(
                    cap = self.settings.unfollow_cap,
                    deferred = report.deferred,
                    "unfollow cap reached"
                );
                break;
            }

            match self.ctx.social.unfollow(peer).await {
                Ok(()) => {
                    self.ctx
                        .store
                        .delete(Table::RelationshipRequests, peer.as_str())
                        .await?;
                    info!(peer = %peer, "unfollowed");
                    report.unfollowed += 1;
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "could not unfollow");
                    report.failed += 1;
                }
            }
        }

        info!(
            unfollowed = report.unfollowed,
            failed = report.failed,
            deferred = report.deferred,
            "unfollow finished"
        );
        Ok(report)
    }

    /// Walk every page of an id listing, pausing after each full page.
    async fn collect_ids(&self, listing: IdListing) -> Result<Vec<PeerId>, PlatformError> {
        let social = self.ctx.social.as_ref();
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = match listing {
                IdListing::Followees => social.followee_ids_page(cursor.as_deref()).await?,
                IdListing::Followers => social.follower_ids_page(cursor.as_deref()).await?,
            };
            let full = page.ids.len() >= MAX_ID_PAGE_SIZE;
            ids.extend(page.ids);

            if full {
                debug!(?listing, pause = ?self.settings.page_pause, "full id page, pausing");
                tokio::time::sleep(self.settings.page_pause).await;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::RecordStore;
    use crate::testing::{Harness, at};
    use rstest::rstest;

    fn settings() -> RelationshipSettings {
        RelationshipSettings {
            follower_retrieve_limit: 100,
            unfollow_cap: 180,
            page_pause: Duration::from_secs(60),
        }
    }

    fn profiles(ids: &[&str]) -> Vec<PeerProfile> {
        ids.iter()
            .map(|id| PeerProfile::new(*id, format!("user_{id}")))
            .collect()
    }

    async fn requested(h: &Harness) -> Vec<String> {
        h.store
            .scan_all(Table::RelationshipRequests)
            .await
            .unwrap()
            .iter()
            .map(|r| r.key().to_string())
            .collect()
    }

    #[rstest]
    #[case::ok(Ok(()), "SUCCESS")]
    #[case::forbidden(Err(PlatformError::Forbidden("pending".into())), "TERMINAL")]
    #[case::rate_limited(Err(PlatformError::RateLimited), "RETRYABLE")]
    #[case::server(Err(PlatformError::ServerError), "RETRYABLE")]
    fn follow_results_are_classified(
        #[case] result: Result<(), PlatformError>,
        #[case] expected: &str,
    ) {
        let kind = follow_outcome(result).kind();
        assert_eq!(serde_json::to_value(kind).unwrap(), expected);
    }

    #[tokio::test]
    async fn follows_new_followers_once() {
        let h = Harness::new();
        h.social.set_followers(profiles(&["1", "2"]));
        let tracker = RelationshipTracker::new(h.context(), settings());

        let first = tracker.follow_back().await.unwrap();
        assert_eq!(first.followed, 2);

        let second = tracker.follow_back().await.unwrap();
        assert_eq!(second.followed, 0);
        assert_eq!(second.already_requested, 2);
        assert_eq!(h.social.follow_calls(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn forbidden_is_recorded_and_rate_limit_is_not() {
        let h = Harness::new();
        h.social.set_followers(profiles(&["1", "2", "3"]));
        h.social
            .fail_follow("1", PlatformError::Forbidden("request pending".into()));
        h.social.fail_follow("2", PlatformError::RateLimited);
        let tracker = RelationshipTracker::new(h.context(), settings());

        let report = tracker.follow_back().await.unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(report.followed, 1);
        assert_eq!(requested(&h).await, vec!["1", "3"]);

        let request = RelationshipRequest::try_from(
            h.store
                .newest(Table::RelationshipRequests)
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(request.peer_handle, "user_3");
    }

    #[tokio::test]
    async fn follower_limit_is_passed_through() {
        let h = Harness::new();
        h.social.set_followers(profiles(&["1", "2", "3"]));
        let mut s = settings();
        s.follower_retrieve_limit = 2;

        let report = RelationshipTracker::new(h.context(), s)
            .follow_back()
            .await
            .unwrap();
        assert_eq!(report.listed, 2);
    }

    #[tokio::test]
    async fn listing_failure_is_reported_not_raised() {
        let h = Harness::new();
        h.social.fail_followers(PlatformError::Unavailable);
        let report = RelationshipTracker::new(h.context(), settings())
            .follow_back()
            .await
            .unwrap();
        assert!(report.listing_error.is_some());
        assert!(requested(&h).await.is_empty());
    }

    #[tokio::test]
    async fn unfollow_removes_request_so_peer_can_be_followed_again() {
        let h = Harness::new();
        h.store
            .append(RelationshipRequest::new(PeerId::new("gone"), "user_gone", at(1)).into())
            .await
            .unwrap();
        h.social.set_followee_pages(vec![vec!["gone", "stays"]]);
        h.social.set_follower_pages(vec![vec!["stays"]]);
        let tracker = RelationshipTracker::new(h.context(), settings());

        let report = tracker.unfollow().await.unwrap();
        assert_eq!(report.not_following_back, 1);
        assert_eq!(report.unfollowed, 1);
        assert_eq!(h.social.unfollow_calls(), vec!["gone"]);
        assert!(requested(&h).await.is_empty());

        h.social.set_followers(profiles(&["gone"]));
        let again = tracker.follow_back().await.unwrap();
        assert_eq!(again.followed, 1);
    }

    #[tokio::test]
    async fn unfollow_stops_at_cap() {
        let h = Harness::new();
        h.social.set_followee_pages(vec![vec!["a", "b", "c", "d"]]);
        h.social.fail_unfollow("b", PlatformError::Forbidden("nope".into()));
        let mut s = settings();
        s.unfollow_cap = 2;

        let report = RelationshipTracker::new(h.context(), s)
            .unfollow()
            .await
            .unwrap();
        assert_eq!(report.unfollowed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(h.social.unfollow_calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn full_pages_trigger_courtesy_pause() {
        let h = Harness::new();
        let big: Vec<String> = (0..MAX_ID_PAGE_SIZE).map(|i| format!("f{i}")).collect();
        let big_refs: Vec<&str> = big.iter().map(String::as_str).collect();
        h.social
            .set_followee_pages(vec![big_refs.clone(), vec!["last"]]);
        h.social.set_follower_pages(vec![big_refs]);

        let start = tokio::time::Instant::now();
        let report = RelationshipTracker::new(h.context(), settings())
            .unfollow()
            .await
            .unwrap();

        // one full followee page and one full follower page
        assert_eq!(start.elapsed(), Duration::from_secs(120));
        assert_eq!(report.followees, MAX_ID_PAGE_SIZE + 1);
        assert_eq!(report.not_following_back, 1);
        assert_eq!(h.social.unfollow_calls(), vec!["last"]);
    }

    #[tokio::test]
    async fn store_failure_aborts_follow_back() {
        let h = Harness::new();
        h.social.set_followers(profiles(&["1"]));
        h.store.set_offline(true);
        let result = RelationshipTracker::new(h.context(), settings())
            .follow_back()
            .await;
        assert!(result.is_err());
    }
}
