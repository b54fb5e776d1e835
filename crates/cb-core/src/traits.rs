//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Change, Post};

/// Which persistent medium a store writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    File,
    KeyValue,
    Remote,
    Memory,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKind::File => "file",
            StoreKind::KeyValue => "key-value",
            StoreKind::Remote => "remote",
            StoreKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// Durable storage contract for the post collection.
///
/// `load` and `save` always deal in the full, most-recent-first collection.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Returns the current durable collection. A missing or unparsable
    /// document yields an empty collection; only an unreachable medium errors.
    async fn load(&self) -> anyhow::Result<Vec<Post>>;

    /// Replaces the durable collection. Readers never observe a partial write.
    async fn save(&self, posts: &[Post]) -> anyhow::Result<()>;

    /// Persists the result of one mutation. `posts` is the full collection
    /// after the change has been applied in memory.
    async fn commit(&self, posts: &[Post], _change: &Change) -> anyhow::Result<()> {
        self.save(posts).await
    }

    /// Whether the store assigns canonical fields of its own, so that the
    /// forum must reload after every successful mutation.
    fn reconciles(&self) -> bool {
        false
    }

    /// Stores that keep their own id counter hand out the next post id here.
    async fn allocate_post_id(&self) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    /// Reachability probe used when choosing a backend at start-up.
    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Releases pools and handles on shutdown.
    async fn close(&self) {}
}

/// Identity contract: entity ids and creator identifiers.
pub trait IdentityProvider: Send + Sync {
    /// A fresh, globally unique id for a post or reply.
    fn new_entity_id(&self) -> String;

    /// A stable creator identifier for clients that did not report one.
    fn derive_creator_id(&self, client_addr: &str) -> String;

    /// Whether `supplied` may delete an entity created by `stored`.
    fn verify_creator(&self, stored: Option<&str>, supplied: Option<&str>) -> bool;
}
