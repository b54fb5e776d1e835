//! # cb-store-file
//! community-board/crates/cb-plugins/cb-store-file/src/lib.rs
//! Local filesystem implementation of `PostStore`.
//! The whole collection lives in one pretty-printed JSON array that is fully
//! rewritten on every save.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use cb_core::models::Post;
use cb_core::traits::{PostStore, StoreKind};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub struct FileStore {
    /// Target document (e.g., "./data/posts.json")
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Sibling file the next snapshot is staged in before the rename.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "posts.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl PostStore for FileStore {
    fn kind(&self) -> StoreKind {
        StoreKind::File
    }

    /// A missing or unparsable file reads as an empty collection.
    async fn load(&self) -> anyhow::Result<Vec<Post>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", self.path.display()))
            }
        };

        match serde_json::from_slice(&data) {
            Ok(posts) => Ok(posts),
            Err(err) => {
                log::warn!(
                    "{} is not a valid post collection, treating it as empty: {err}",
                    self.path.display()
                );
                Ok(Vec::new())
            }
        }
    }

    /// Writes the snapshot to a staging file, flushes it and renames it over
    /// the target so readers only ever see a complete document.
    async fn save(&self, posts: &[Post]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let json = serde_json::to_vec_pretty(posts)?;
        let staging = self.staging_path();

        let mut file = fs::File::create(&staging)
            .await
            .with_context(|| format!("creating {}", staging.display()))?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        log::debug!("wrote {} post(s) to {}", posts.len(), self.path.display());
        Ok(())
    }
}
