//! InMemoryAssetSource - テスト用のアセットプール
//!
//! アセットの中身はメモリ上に置き、`fetch` で destination に書き出します。
//! `fail_fetch` で key ごとに失敗を仕込めます。

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{AssetKey, FetchError};
use crate::ports::AssetSource;

#[derive(Default)]
struct State {
    assets: BTreeMap<AssetKey, Vec<u8>>,
    failures: HashMap<AssetKey, FetchError>,
    fetched: Vec<AssetKey>,
}

#[derive(Default)]
pub struct InMemoryAssetSource {
    state: Mutex<State>,
}

impl InMemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source = Self::new();
        for key in keys {
            source.insert(key, b"asset".to_vec());
        }
        source
    }

    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.lock().assets.insert(AssetKey::new(key), bytes);
    }

    pub fn remove(&self, key: &str) {
        self.lock().assets.remove(&AssetKey::new(key));
    }

    /// Every later fetch of `key` fails with `error`.
    pub fn fail_fetch(&self, key: &str, error: FetchError) {
        self.lock().failures.insert(AssetKey::new(key), error);
    }

    /// Keys passed to `fetch`, in call order.
    pub fn fetched(&self) -> Vec<AssetKey> {
        self.lock().fetched.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AssetSource for InMemoryAssetSource {
    async fn list_keys(&self, namespace: &str) -> Result<Vec<AssetKey>, FetchError> {
        Ok(self
            .lock()
            .assets
            .keys()
            .filter(|k| k.as_str().starts_with(namespace))
            .cloned()
            .collect())
    }

    async fn fetch(&self, key: &AssetKey, destination: &Path) -> Result<(), FetchError> {
        let bytes = {
            let mut state = self.lock();
            state.fetched.push(key.clone());
            if let Some(err) = state.failures.get(key) {
                return Err(err.clone());
            }
            state
                .assets
                .get(key)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(key.clone()))?
        };

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !tokio::fs::try_exists(parent).await.unwrap_or(false) {
                return Err(FetchError::FolderMissing(parent.to_path_buf()));
            }
        }
        tokio::fs::write(destination, bytes)
            .await
            .map_err(|e| FetchError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_by_prefix_in_key_order() {
        let source = InMemoryAssetSource::with_keys(["pics/b", "pics/a", "other/c"]);
        let keys = source.list_keys("pics/").await.unwrap();
        assert_eq!(keys, vec![AssetKey::new("pics/a"), AssetKey::new("pics/b")]);
    }

    #[tokio::test]
    async fn scripted_failure_wins_over_content() {
        let dir = tempdir().unwrap();
        let source = InMemoryAssetSource::with_keys(["a"]);
        source.fail_fetch("a", FetchError::Io("flaky".into()));

        let err = source
            .fetch(&AssetKey::new("a"), &dir.path().join("a"))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Io("flaky".into()));
        assert_eq!(source.fetched(), vec![AssetKey::new("a")]);
    }

    #[tokio::test]
    async fn removed_asset_is_not_found() {
        let dir = tempdir().unwrap();
        let source = InMemoryAssetSource::with_keys(["a"]);
        source.remove("a");
        let err = source
            .fetch(&AssetKey::new("a"), &dir.path().join("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }
}
