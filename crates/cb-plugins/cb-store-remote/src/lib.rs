//! # cb-store-remote
//!
//! Hosted relational storage reached over a PostgREST-style HTTP API.
//!
//! Two tables back the collection:
//!
//! - `posts(id, author, title, content, created_at, creator_id)`
//! - `replies(id, post_id, author, content, created_at, creator_id)`
//!
//! Single-row inserts and deletes are native, so `commit` only sends the one
//! change. The table owner may rewrite fields such as `created_at`, which is
//! why the store asks the forum to reload after every mutation.

use async_trait::async_trait;
use cb_core::models::{Change, Post, Reply};
use cb_core::traits::{PostStore, StoreKind};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

const REST_PATH: &str = "/rest/v1";
const POSTS_TABLE: &str = "posts";
const REPLIES_TABLE: &str = "replies";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RemoteStoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{table} request rejected with status {status}: {body}")]
    Rejected {
        table: &'static str,
        status: u16,
        body: String,
    },
}

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, Serialize)]
struct PostRow<'a> {
    id: &'a str,
    author: &'a str,
    title: &'a str,
    content: &'a str,
    created_at: DateTime<Utc>,
    creator_id: Option<&'a str>,
}

impl<'a> From<&'a Post> for PostRow<'a> {
    fn from(post: &'a Post) -> Self {
        Self {
            id: &post.id,
            author: &post.author,
            title: &post.title,
            content: &post.content,
            created_at: post.created_at,
            creator_id: post.creator_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReplyRow<'a> {
    id: &'a str,
    post_id: &'a str,
    author: &'a str,
    content: &'a str,
    created_at: DateTime<Utc>,
    creator_id: Option<&'a str>,
}

impl<'a> ReplyRow<'a> {
    fn new(post_id: &'a str, reply: &'a Reply) -> Self {
        Self {
            id: &reply.id,
            post_id,
            author: &reply.author,
            content: &reply.content,
            created_at: reply.created_at,
            creator_id: reply.creator_id.as_deref(),
        }
    }
}

/// PostgREST `in` list, e.g. `("a","b")`.
fn in_list<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = ids
        .into_iter()
        .map(|id| format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("({})", quoted.join(","))
}

// =============================================================================
// Remote Store
// =============================================================================

pub struct RemoteStore {
    client: Client,
    /// Project URL, without the REST path (e.g. `https://xyz.supabase.co`)
    base_url: String,
    api_key: SecretString,
}

impl RemoteStore {
    pub fn new(base_url: &str, api_key: SecretString) -> Result<Self, RemoteStoreError> {
        let client = Client::builder()
            .user_agent(concat!("community-board/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let key = self.api_key.expose_secret();
        self.client
            .request(method, format!("{}{REST_PATH}/{table}", self.base_url))
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn send(
        &self,
        table: &'static str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, RemoteStoreError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteStoreError::Rejected {
            table,
            status: status.as_u16(),
            body,
        })
    }

    async fn insert<T: Serialize + ?Sized>(
        &self,
        table: &'static str,
        rows: &T,
        upsert: bool,
    ) -> Result<(), RemoteStoreError> {
        let prefer = if upsert {
            "resolution=merge-duplicates,return=minimal"
        } else {
            "return=minimal"
        };
        let request = self
            .request(Method::POST, table)
            .header("Prefer", prefer)
            .json(rows);
        self.send(table, request).await?;
        Ok(())
    }

    async fn delete_where(
        &self,
        table: &'static str,
        filters: &[(&str, String)],
    ) -> Result<(), RemoteStoreError> {
        let request = self.request(Method::DELETE, table).query(filters);
        self.send(table, request).await?;
        Ok(())
    }

    /// Removes every row of `table` whose id is not in `keep`.
    async fn delete_all_except(
        &self,
        table: &'static str,
        keep: &[&str],
    ) -> Result<(), RemoteStoreError> {
        let filter = if keep.is_empty() {
            "not.is.null".to_string()
        } else {
            format!("not.in.{}", in_list(keep.iter().copied()))
        };
        self.delete_where(table, &[("id", filter)]).await
    }

    /// Drops posts pushed past the cap, replies first. Failures leave the
    /// rows behind for the next `save` to remove.
    async fn prune_posts(&self, evicted: &[String]) {
        let ids = in_list(evicted.iter().map(String::as_str));
        let result: Result<(), RemoteStoreError> = async {
            self.delete_where(REPLIES_TABLE, &[("post_id", format!("in.{ids}"))])
                .await?;
            self.delete_where(POSTS_TABLE, &[("id", format!("in.{ids}"))])
                .await
        }
        .await;
        if let Err(err) = result {
            log::warn!("could not prune {} evicted post(s): {err}", evicted.len());
        }
    }
}

#[async_trait]
impl PostStore for RemoteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Remote
    }

    async fn load(&self) -> anyhow::Result<Vec<Post>> {
        let request = self
            .request(Method::GET, POSTS_TABLE)
            .query(&[("select", "*,replies(*)"), ("order", "created_at.desc")]);
        let mut posts: Vec<Post> = self.send(POSTS_TABLE, request).await?.json().await?;
        for post in &mut posts {
            post.replies.sort_by_key(|r| r.created_at);
        }
        Ok(posts)
    }

    /// Upserts every row, then deletes rows that are no longer part of the
    /// collection. Not isolated from concurrent writers.
    async fn save(&self, posts: &[Post]) -> anyhow::Result<()> {
        let post_rows: Vec<PostRow<'_>> = posts.iter().map(PostRow::from).collect();
        let reply_rows: Vec<ReplyRow<'_>> = posts
            .iter()
            .flat_map(|p| p.replies.iter().map(move |r| ReplyRow::new(&p.id, r)))
            .collect();

        if !post_rows.is_empty() {
            self.insert(POSTS_TABLE, &post_rows, true).await?;
        }
        if !reply_rows.is_empty() {
            self.insert(REPLIES_TABLE, &reply_rows, true).await?;
        }

        let reply_ids: Vec<&str> = reply_rows.iter().map(|r| r.id).collect();
        self.delete_all_except(REPLIES_TABLE, &reply_ids).await?;
        let post_ids: Vec<&str> = post_rows.iter().map(|p| p.id).collect();
        self.delete_all_except(POSTS_TABLE, &post_ids).await?;

        log::debug!(
            "synchronised {} post(s) and {} reply(ies) to the hosted store",
            post_rows.len(),
            reply_rows.len()
        );
        Ok(())
    }

    /// The row insert or delete named by `change` is the point of success;
    /// clean-up of dependent rows after it is best-effort and only logged.
    async fn commit(&self, _posts: &[Post], change: &Change) -> anyhow::Result<()> {
        match change {
            Change::InsertPost { post, evicted } => {
                self.insert(POSTS_TABLE, &[PostRow::from(post)], false).await?;
                if !evicted.is_empty() {
                    self.prune_posts(evicted).await;
                }
            }
            Change::DeletePost { post_id } => {
                self.delete_where(POSTS_TABLE, &[("id", format!("eq.{post_id}"))])
                    .await?;
                let orphans = [("post_id", format!("eq.{post_id}"))];
                if let Err(err) = self.delete_where(REPLIES_TABLE, &orphans).await {
                    log::warn!("post {post_id} deleted but its replies were not: {err}");
                }
            }
            Change::InsertReply { post_id, reply } => {
                self.insert(REPLIES_TABLE, &[ReplyRow::new(post_id, reply)], false)
                    .await?;
            }
            Change::DeleteReply { post_id, reply_id } => {
                self.delete_where(
                    REPLIES_TABLE,
                    &[
                        ("id", format!("eq.{reply_id}")),
                        ("post_id", format!("eq.{post_id}")),
                    ],
                )
                .await?;
            }
        }
        Ok(())
    }

    fn reconciles(&self) -> bool {
        true
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let request = self
            .request(Method::GET, POSTS_TABLE)
            .query(&[("select", "id"), ("limit", "1")]);
        self.send(POSTS_TABLE, request).await?;
        Ok(())
    }
}
