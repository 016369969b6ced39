//! SocialClient port - SNS プラットフォーム API
//!
//! 認証・ページング・レート制限の詳細は実装側の責務です。
//! このポートはエラーを `PlatformError` に分類して返すことだけを約束します。

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{PeerId, PlatformError};

/// Largest page the platform returns for id listings.
///
/// A full page means more pages follow, and the tracker pauses before the next one.
pub const MAX_ID_PAGE_SIZE: usize = 5000;

/// Platform handle for uploaded media, referenced by a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaHandle(pub String);

/// A follower as returned by `list_followers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerProfile {
    pub id: PeerId,
    pub handle: String,
}

impl PeerProfile {
    pub fn new(id: impl Into<PeerId>, handle: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
        }
    }
}

/// One page of an id listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdPage {
    pub ids: Vec<PeerId>,
    /// Cursor of the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

/// SocialClient は投稿とフォロー関係の操作を提供
#[async_trait]
pub trait SocialClient: Send + Sync {
    async fn upload_media(&self, path: &Path) -> Result<MediaHandle, PlatformError>;

    async fn create_post(&self, text: &str, media: &[MediaHandle]) -> Result<(), PlatformError>;

    /// Up to `limit` current followers, newest first.
    async fn list_followers(&self, limit: usize) -> Result<Vec<PeerProfile>, PlatformError>;

    /// Accounts this account follows. `cursor` is `None` for the first page.
    async fn followee_ids_page(&self, cursor: Option<&str>) -> Result<IdPage, PlatformError>;

    /// Accounts following this account. `cursor` is `None` for the first page.
    async fn follower_ids_page(&self, cursor: Option<&str>) -> Result<IdPage, PlatformError>;

    async fn follow(&self, peer: &PeerId) -> Result<(), PlatformError>;

    async fn unfollow(&self, peer: &PeerId) -> Result<(), PlatformError>;
}
