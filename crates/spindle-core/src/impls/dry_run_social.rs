//! DryRunSocialClient - 何も送信しない SocialClient
//!
//! 投稿・フォロー操作をログに出すだけです。フォロワー一覧は常に空。
//! 実際のプラットフォーム API クライアントはこのクレートの外側に置きます。

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::domain::{PeerId, PlatformError};
use crate::ports::{IdPage, MediaHandle, PeerProfile, SocialClient};

#[derive(Debug, Default)]
pub struct DryRunSocialClient {
    uploads: AtomicU64,
    posts: AtomicU64,
}

impl DryRunSocialClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posts(&self) -> u64 {
        self.posts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SocialClient for DryRunSocialClient {
    async fn upload_media(&self, path: &Path) -> Result<MediaHandle, PlatformError> {
        let n = self.uploads.fetch_add(1, Ordering::Relaxed) + 1;
        info!(path = %path.display(), "dry run: upload media");
        Ok(MediaHandle(format!("dry-run-media-{n}")))
    }

    async fn create_post(&self, text: &str, media: &[MediaHandle]) -> Result<(), PlatformError> {
        self.posts.fetch_add(1, Ordering::Relaxed);
        info!(text, media = media.len(), "dry run: create post");
        Ok(())
    }

    async fn list_followers(&self, _limit: usize) -> Result<Vec<PeerProfile>, PlatformError> {
        Ok(Vec::new())
    }

    async fn followee_ids_page(&self, _cursor: Option<&str>) -> Result<IdPage, PlatformError> {
        Ok(IdPage::default())
    }

    async fn follower_ids_page(&self, _cursor: Option<&str>) -> Result<IdPage, PlatformError> {
        Ok(IdPage::default())
    }

    async fn follow(&self, peer: &PeerId) -> Result<(), PlatformError> {
        info!(peer = %peer, "dry run: follow");
        Ok(())
    }

    async fn unfollow(&self, peer: &PeerId) -> Result<(), PlatformError> {
        info!(peer = %peer, "dry run: unfollow");
        Ok(())
    }
}
