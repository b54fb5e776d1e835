//! # cb-store-kv Implementation
//!
//! Device-local key/value storage backed by an embedded SQLite database.
//! The post collection is kept as one JSON value under [`POSTS_KEY`]; the last
//! issued integer post id lives under [`COUNTER_KEY`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use cb_core::models::Post;
use cb_core::traits::{PostStore, StoreKind};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Executor;

pub const POSTS_KEY: &str = "communityPosts";
pub const COUNTER_KEY: &str = "postIdCounter";

pub struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    /// Opens (creating if needed) the database at `url`, e.g.
    /// `sqlite://data/community.db` or `sqlite::memory:`.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("parsing {url}"))?
            .create_if_missing(true);

        if let Some(parent) = database_dir(url) {
            tokio::fs::create_dir_all(&parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        // One long-lived connection: values are read and written whole, and an
        // in-memory database disappears with its last connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .with_context(|| format!("opening {url}"))?;

        sqlx::query("CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }
}

/// Directory holding a file-backed database, `None` for in-memory ones.
fn database_dir(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

async fn get_value<'e, E>(executor: E, key: &str) -> sqlx::Result<Option<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, String>("SELECT value FROM kv WHERE key = ?")
        .bind(key)
        .fetch_optional(executor)
        .await
}

async fn put_value<'e, E>(executor: E, key: &str, value: &str) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO kv (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;
    Ok(())
}

fn parse_posts(raw: Option<String>) -> Vec<Post> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|err| {
        log::warn!("value under {POSTS_KEY} is not a valid post collection, treating it as empty: {err}");
        Vec::new()
    })
}

#[async_trait]
impl PostStore for KvStore {
    fn kind(&self) -> StoreKind {
        StoreKind::KeyValue
    }

    async fn load(&self) -> anyhow::Result<Vec<Post>> {
        let raw = get_value(&self.pool, POSTS_KEY).await?;
        Ok(parse_posts(raw))
    }

    /// A single upsert, so the previous value stays visible until it commits.
    async fn save(&self, posts: &[Post]) -> anyhow::Result<()> {
        let json = serde_json::to_string(posts)?;
        put_value(&self.pool, POSTS_KEY, &json).await?;
        Ok(())
    }

    /// Next integer id. Never reuses an id already present in the collection,
    /// even if the counter was lost or reset.
    async fn allocate_post_id(&self) -> anyhow::Result<Option<String>> {
        let mut tx = self.pool.begin().await?;

        let last_issued = get_value(&mut *tx, COUNTER_KEY)
            .await?
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let highest_stored = parse_posts(get_value(&mut *tx, POSTS_KEY).await?)
            .iter()
            .filter_map(|p| p.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        let next = last_issued.max(highest_stored) + 1;
        put_value(&mut *tx, COUNTER_KEY, &next.to_string()).await?;
        tx.commit().await?;

        Ok(Some(next.to_string()))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
