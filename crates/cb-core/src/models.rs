//! # Domain Models
//!
//! These structs represent the core entities of the community board.
//! Ids are opaque strings; counter-based stores write integers, which the
//! decoder normalises to their decimal form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Display name used when the author field is left blank.
pub const ANONYMOUS: &str = "Anonymous";

/// A top-level discussion entry owning an ordered list of replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default = "anonymous")]
    pub author: String,
    pub title: String,
    pub content: String,
    /// Older browser-side stores wrote this field as `timestamp`.
    #[serde(alias = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Self-reported identifier of the originating client; only gates deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
    /// Insertion order. Only ever appended to or removed from.
    #[serde(default)]
    pub replies: Vec<Reply>,
}

impl Post {
    pub fn reply(&self, reply_id: &str) -> Option<&Reply> {
        self.replies.iter().find(|r| r.id == reply_id)
    }
}

/// A response attached to exactly one Post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default = "anonymous")]
    pub author: String,
    pub content: String,
    #[serde(alias = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
}

/// User input for a new post, before ids and timestamps are assigned.
///
/// Missing fields decode as empty strings so that they are reported as
/// validation failures rather than malformed input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostDraft {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub creator_id: Option<String>,
}

/// User input for a new reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyDraft {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub creator_id: Option<String>,
}

/// A single mutation, as handed to the store alongside the full collection.
///
/// Whole-collection stores ignore it; stores with native row operations
/// apply only this change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    InsertPost { post: Post, evicted: Vec<String> },
    DeletePost { post_id: String },
    InsertReply { post_id: String, reply: Reply },
    DeleteReply { post_id: String, reply_id: String },
}

/// Blank or missing author names fall back to [`ANONYMOUS`].
pub fn display_name(author: Option<&str>) -> String {
    match author.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => ANONYMOUS.to_string(),
    }
}

fn anonymous() -> String {
    ANONYMOUS.to_string()
}

fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}
