//! # Tiered storage
//!
//! Wraps the store chosen at start-up with the next tier down. A failed
//! operation is retried once against the fallback; the primary stays
//! selected for everything that follows.

use async_trait::async_trait;

use crate::models::{Change, Post};
use crate::traits::{PostStore, StoreKind};

pub struct TieredStore {
    primary: Box<dyn PostStore>,
    fallback: Option<Box<dyn PostStore>>,
}

impl TieredStore {
    pub fn new(primary: Box<dyn PostStore>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Box<dyn PostStore>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Returns the fallback tier if there is one, logging why it is used.
    fn fallback_for(&self, op: &str, err: &anyhow::Error) -> Option<&dyn PostStore> {
        let fallback = self.fallback.as_deref()?;
        log::warn!(
            "{op} against {} store failed ({err:#}); using {} store for this operation",
            self.primary.kind(),
            fallback.kind()
        );
        Some(fallback)
    }
}

#[async_trait]
impl PostStore for TieredStore {
    fn kind(&self) -> StoreKind {
        self.primary.kind()
    }

    async fn load(&self) -> anyhow::Result<Vec<Post>> {
        match self.primary.load().await {
            Ok(posts) => Ok(posts),
            Err(err) => match self.fallback_for("load", &err) {
                Some(fallback) => fallback.load().await,
                None => Err(err),
            },
        }
    }

    async fn save(&self, posts: &[Post]) -> anyhow::Result<()> {
        match self.primary.save(posts).await {
            Ok(()) => Ok(()),
            Err(err) => match self.fallback_for("save", &err) {
                Some(fallback) => fallback.save(posts).await,
                None => Err(err),
            },
        }
    }

    async fn commit(&self, posts: &[Post], change: &Change) -> anyhow::Result<()> {
        match self.primary.commit(posts, change).await {
            Ok(()) => Ok(()),
            Err(err) => match self.fallback_for("commit", &err) {
                Some(fallback) => fallback.commit(posts, change).await,
                None => Err(err),
            },
        }
    }

    fn reconciles(&self) -> bool {
        self.primary.reconciles()
    }

    async fn allocate_post_id(&self) -> anyhow::Result<Option<String>> {
        match self.primary.allocate_post_id().await {
            Ok(id) => Ok(id),
            Err(err) => match self.fallback_for("id allocation", &err) {
                Some(fallback) => fallback.allocate_post_id().await,
                None => Err(err),
            },
        }
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.primary.ping().await
    }

    async fn close(&self) {
        self.primary.close().await;
        if let Some(fallback) = &self.fallback {
            fallback.close().await;
        }
    }
}
