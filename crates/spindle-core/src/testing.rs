//! Test doubles shared by the component tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::app::AgentContext;
use crate::domain::{PeerId, PlatformError};
use crate::impls::{InMemoryAssetSource, InMemoryRecordStore};
use crate::ports::{FixedClock, IdPage, MediaHandle, PeerProfile, SocialClient};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

#[derive(Default)]
struct Script {
    uploads: VecDeque<Result<MediaHandle, PlatformError>>,
    posts: VecDeque<Result<(), PlatformError>>,
    upload_calls: usize,
    created: Vec<(String, Vec<MediaHandle>)>,

    followers: Vec<PeerProfile>,
    followers_error: Option<PlatformError>,
    followee_pages: Vec<Vec<PeerId>>,
    follower_pages: Vec<Vec<PeerId>>,
    follow_errors: HashMap<PeerId, PlatformError>,
    unfollow_errors: HashMap<PeerId, PlatformError>,
    follow_calls: Vec<PeerId>,
    unfollow_calls: Vec<PeerId>,
}

/// SocialClient whose responses are queued up front. Unscripted calls succeed.
#[derive(Default)]
pub struct ScriptedSocialClient {
    script: Mutex<Script>,
}

impl ScriptedSocialClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn push_upload(&self, result: Result<MediaHandle, PlatformError>) {
        self.lock().uploads.push_back(result);
    }

    pub fn push_post(&self, result: Result<(), PlatformError>) {
        self.lock().posts.push_back(result);
    }

    pub fn upload_calls(&self) -> usize {
        self.lock().upload_calls
    }

    /// Posts that were accepted, with their text.
    pub fn created_posts(&self) -> Vec<String> {
        self.lock().created.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn set_followers(&self, followers: Vec<PeerProfile>) {
        self.lock().followers = followers;
    }

    pub fn fail_followers(&self, error: PlatformError) {
        self.lock().followers_error = Some(error);
    }

    pub fn set_followee_pages(&self, pages: Vec<Vec<&str>>) {
        self.lock().followee_pages = to_pages(pages);
    }

    pub fn set_follower_pages(&self, pages: Vec<Vec<&str>>) {
        self.lock().follower_pages = to_pages(pages);
    }

    pub fn fail_follow(&self, peer: &str, error: PlatformError) {
        self.lock().follow_errors.insert(PeerId::new(peer), error);
    }

    pub fn fail_unfollow(&self, peer: &str, error: PlatformError) {
        self.lock().unfollow_errors.insert(PeerId::new(peer), error);
    }

    pub fn follow_calls(&self) -> Vec<String> {
        self.lock().follow_calls.iter().map(|p| p.to_string()).collect()
    }

    pub fn unfollow_calls(&self) -> Vec<String> {
        self.lock().unfollow_calls.iter().map(|p| p.to_string()).collect()
    }
}

fn to_pages(pages: Vec<Vec<&str>>) -> Vec<Vec<PeerId>> {
    pages
        .into_iter()
        .map(|page| page.into_iter().map(PeerId::new).collect())
        .collect()
}

fn page_at(pages: &[Vec<PeerId>], cursor: Option<&str>) -> IdPage {
    let index = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
    let ids = pages.get(index).cloned().unwrap_or_default();
    let next_cursor = (index + 1 < pages.len()).then(|| (index + 1).to_string());
    IdPage { ids, next_cursor }
}

#[async_trait]
impl SocialClient for ScriptedSocialClient {
    async fn upload_media(&self, _path: &Path) -> Result<MediaHandle, PlatformError> {
        let mut script = self.lock();
        script.upload_calls += 1;
        let n = script.upload_calls;
        script
            .uploads
            .pop_front()
            .unwrap_or_else(|| Ok(MediaHandle(format!("media-{n}"))))
    }

    async fn create_post(&self, text: &str, media: &[MediaHandle]) -> Result<(), PlatformError> {
        let mut script = self.lock();
        let result = script.posts.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            script.created.push((text.to_string(), media.to_vec()));
        }
        result
    }

    async fn list_followers(&self, limit: usize) -> Result<Vec<PeerProfile>, PlatformError> {
        let script = self.lock();
        if let Some(err) = &script.followers_error {
            return Err(err.clone());
        }
        Ok(script.followers.iter().take(limit).cloned().collect())
    }

    async fn followee_ids_page(&self, cursor: Option<&str>) -> Result<IdPage, PlatformError> {
        Ok(page_at(&self.lock().followee_pages, cursor))
    }

    async fn follower_ids_page(&self, cursor: Option<&str>) -> Result<IdPage, PlatformError> {
        Ok(page_at(&self.lock().follower_pages, cursor))
    }

    async fn follow(&self, peer: &PeerId) -> Result<(), PlatformError> {
        let mut script = self.lock();
        script.follow_calls.push(peer.clone());
        script.follow_errors.get(peer).cloned().map_or(Ok(()), Err)
    }

    async fn unfollow(&self, peer: &PeerId) -> Result<(), PlatformError> {
        let mut script = self.lock();
        script.unfollow_calls.push(peer.clone());
        script.unfollow_errors.get(peer).cloned().map_or(Ok(()), Err)
    }
}

/// In-memory wiring with handles kept for assertions.
pub struct Harness {
    pub store: Arc<InMemoryRecordStore>,
    pub assets: Arc<InMemoryAssetSource>,
    pub social: Arc<ScriptedSocialClient>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryRecordStore::new()),
            assets: Arc::new(InMemoryAssetSource::new()),
            social: Arc::new(ScriptedSocialClient::new()),
            clock: Arc::new(FixedClock::new(at(1_700_000_000))),
        }
    }

    pub fn context(&self) -> AgentContext {
        AgentContext {
            account: Arc::from("test_account"),
            store: self.store.clone(),
            assets: self.assets.clone(),
            social: self.social.clone(),
            clock: self.clock.clone(),
        }
    }
}
