//! LocalDirAssetSource - ローカルディレクトリをアセットプールとして扱う
//!
//! bucket = ルートディレクトリ、key = ルートからの相対パス（`/` 区切り）。
//! namespace はルート直下のサブディレクトリ（空文字ならルート全体）。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::domain::{AssetKey, FetchError};
use crate::ports::AssetSource;

#[derive(Debug, Clone)]
pub struct LocalDirAssetSource {
    root: PathBuf,
}

impl LocalDirAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Source path of `key`, or `None` when the key would leave the root.
    fn source_path(&self, key: &AssetKey) -> Option<PathBuf> {
        let relative = Path::new(key.as_str());
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        contained.then(|| self.root.join(relative))
    }

    fn key_of(&self, path: &Path) -> Option<AssetKey> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(AssetKey::new(parts.join("/")))
    }
}

fn io_err(e: std::io::Error) -> FetchError {
    FetchError::Io(e.to_string())
}

#[async_trait]
impl AssetSource for LocalDirAssetSource {
    async fn list_keys(&self, namespace: &str) -> Result<Vec<AssetKey>, FetchError> {
        let start = if namespace.is_empty() {
            self.root.clone()
        } else {
            self.root.join(namespace)
        };
        if !fs::try_exists(&start).await.map_err(io_err)? {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(io_err)?;
            while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
                let file_type = entry.file_type().await.map_err(io_err)?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    if let Some(key) = self.key_of(&entry.path()) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn fetch(&self, key: &AssetKey, destination: &Path) -> Result<(), FetchError> {
        if fs::metadata(destination).await.is_ok_and(|m| m.is_dir()) {
            return Err(FetchError::IsDirectory(destination.to_path_buf()));
        }
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !fs::try_exists(parent).await.map_err(io_err)? {
                return Err(FetchError::FolderMissing(parent.to_path_buf()));
            }
        }

        let source = self
            .source_path(key)
            .ok_or_else(|| FetchError::NotFound(key.clone()))?;
        let meta = match fs::metadata(&source).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound(key.clone()));
            }
            Err(e) => return Err(io_err(e)),
        };
        if meta.is_dir() {
            return Err(FetchError::IsDirectory(destination.to_path_buf()));
        }

        fs::copy(&source, destination).await.map_err(io_err)?;
        Ok(())
    }
}
