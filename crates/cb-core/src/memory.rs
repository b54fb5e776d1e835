//! In-process `PostStore`, used by tests and the `memory` backend.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::Post;
use crate::traits::{PostStore, StoreKind};

#[derive(Default)]
pub struct MemoryStore {
    posts: RwLock<Vec<Post>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(posts: Vec<Post>) -> Self {
        Self {
            posts: RwLock::new(posts),
        }
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    async fn load(&self) -> anyhow::Result<Vec<Post>> {
        Ok(self.posts.read().await.clone())
    }

    async fn save(&self, posts: &[Post]) -> anyhow::Result<()> {
        *self.posts.write().await = posts.to_vec();
        Ok(())
    }
}
