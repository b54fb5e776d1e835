//! # Forum
//!
//! The in-memory post collection and the mutations the presentation layer
//! may request. Every mutation is an independent load-modify-commit cycle
//! against the store; the cached snapshot only changes once the store has
//! accepted the write.
//!
//! Within one process mutations are serialised by the snapshot lock. Separate
//! processes sharing a store get last-writer-wins semantics and concurrent
//! updates may be lost.

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{display_name, Change, Post, PostDraft, Reply, ReplyDraft};
use crate::traits::{IdentityProvider, PostStore, StoreKind};

/// Default cap on stored posts.
pub const DEFAULT_MAX_POSTS: usize = 100;

pub struct Forum {
    store: Box<dyn PostStore>,
    identity: Box<dyn IdentityProvider>,
    max_posts: usize,
    posts: Mutex<Vec<Post>>,
}

impl Forum {
    /// Builds the forum and performs the initial load.
    pub async fn new(
        store: Box<dyn PostStore>,
        identity: Box<dyn IdentityProvider>,
        max_posts: usize,
    ) -> Self {
        let forum = Self {
            store,
            identity,
            max_posts: max_posts.max(1),
            posts: Mutex::new(Vec::new()),
        };
        forum.refresh().await;
        forum
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    pub fn store_kind(&self) -> StoreKind {
        self.store.kind()
    }

    /// The last reconciled state, without touching the store.
    pub async fn snapshot(&self) -> Vec<Post> {
        self.posts.lock().await.clone()
    }

    /// Reloads from the store. A failed load is swallowed and replaced by an
    /// empty collection so that callers can still render something.
    ///
    /// The snapshot lock is held across the load so that a reload can never
    /// land on top of a mutation that committed while it was in flight.
    async fn refresh(&self) -> Vec<Post> {
        let mut snapshot = self.posts.lock().await;
        let latest = match self.store.load().await {
            Ok(posts) => posts,
            Err(err) => {
                log::warn!(
                    "loading from {} store failed, serving an empty feed: {err:#}",
                    self.store.kind()
                );
                Vec::new()
            }
        };
        *snapshot = latest.clone();
        latest
    }

    /// Current posts, most recent first, reloaded so that writes from other
    /// clients are visible.
    pub async fn list_posts(&self) -> Vec<Post> {
        self.refresh().await
    }

    pub async fn create_post(&self, draft: PostDraft) -> Result<Post> {
        let title = draft.title.trim();
        let content = draft.content.trim();
        if title.is_empty() || content.is_empty() {
            return Err(AppError::ValidationError(
                "title and content are required".into(),
            ));
        }

        let allocated = self
            .store
            .allocate_post_id()
            .await
            .map_err(|e| AppError::storage("allocating post id", e))?;

        let created = self
            .mutate(
                |posts| {
                    let id = allocated
                        .unwrap_or_else(|| self.fresh_id(|id| posts.iter().any(|p| p.id == id)));
                    let post = Post {
                        id,
                        author: display_name(draft.author.as_deref()),
                        title: title.to_string(),
                        content: content.to_string(),
                        created_at: Utc::now(),
                        creator_id: draft.creator_id.clone(),
                        replies: Vec::new(),
                    };

                    posts.insert(0, post.clone());
                    let evicted: Vec<String> = posts
                        .iter()
                        .skip(self.max_posts)
                        .map(|p| p.id.clone())
                        .collect();
                    if !evicted.is_empty() {
                        log::debug!("pruning {} post(s) beyond the cap", evicted.len());
                        posts.truncate(self.max_posts);
                    }

                    Ok((Change::InsertPost { post: post.clone(), evicted }, post))
                },
                canonical_post,
            )
            .await?;

        log::info!("created post {}", created.id);
        Ok(created)
    }

    pub async fn delete_post(&self, post_id: &str, creator_id: Option<&str>) -> Result<()> {
        self.mutate(
            |posts| {
                let index = posts
                    .iter()
                    .position(|p| p.id == post_id)
                    .ok_or_else(|| AppError::not_found("post", post_id))?;
                if !self
                    .identity
                    .verify_creator(posts[index].creator_id.as_deref(), creator_id)
                {
                    return Err(AppError::Forbidden(
                        "not authorized to delete this post".into(),
                    ));
                }
                posts.remove(index);
                Ok((
                    Change::DeletePost {
                        post_id: post_id.to_string(),
                    },
                    (),
                ))
            },
            |_, done| done,
        )
        .await?;

        log::info!("deleted post {post_id}");
        Ok(())
    }

    pub async fn add_reply(&self, post_id: &str, draft: ReplyDraft) -> Result<Reply> {
        let content = draft.content.trim();
        if content.is_empty() {
            return Err(AppError::ValidationError("content is required".into()));
        }

        let created = self
            .mutate(
                |posts| {
                    let post = posts
                        .iter_mut()
                        .find(|p| p.id == post_id)
                        .ok_or_else(|| AppError::not_found("post", post_id))?;
                    let id = self.fresh_id(|id| post.replies.iter().any(|r| r.id == id));
                    let reply = Reply {
                        id,
                        author: display_name(draft.author.as_deref()),
                        content: content.to_string(),
                        created_at: Utc::now(),
                        creator_id: draft.creator_id.clone(),
                    };
                    post.replies.push(reply.clone());
                    Ok((
                        Change::InsertReply {
                            post_id: post_id.to_string(),
                            reply: reply.clone(),
                        },
                        reply,
                    ))
                },
                |posts, reply| canonical_reply(posts, post_id, reply),
            )
            .await?;

        log::info!("added reply {} to post {post_id}", created.id);
        Ok(created)
    }

    pub async fn delete_reply(
        &self,
        post_id: &str,
        reply_id: &str,
        creator_id: Option<&str>,
    ) -> Result<()> {
        self.mutate(
            |posts| {
                let post = posts
                    .iter_mut()
                    .find(|p| p.id == post_id)
                    .ok_or_else(|| AppError::not_found("post", post_id))?;
                let index = post
                    .replies
                    .iter()
                    .position(|r| r.id == reply_id)
                    .ok_or_else(|| AppError::not_found("reply", reply_id))?;
                if !self
                    .identity
                    .verify_creator(post.replies[index].creator_id.as_deref(), creator_id)
                {
                    return Err(AppError::Forbidden(
                        "not authorized to delete this reply".into(),
                    ));
                }
                post.replies.remove(index);
                Ok((
                    Change::DeleteReply {
                        post_id: post_id.to_string(),
                        reply_id: reply_id.to_string(),
                    },
                    (),
                ))
            },
            |_, done| done,
        )
        .await?;

        log::info!("deleted reply {reply_id} from post {post_id}");
        Ok(())
    }

    /// Releases the store. The forum must not be used afterwards.
    pub async fn close(&self) {
        self.store.close().await;
    }

    /// Runs one load-modify-commit cycle. `apply` edits the freshly loaded
    /// collection and describes the change; nothing is cached unless the
    /// store accepts it. `resolve` maps the outcome onto the reconciled
    /// collection before the snapshot lock is released.
    async fn mutate<T, F, R>(&self, apply: F, resolve: R) -> Result<T>
    where
        F: FnOnce(&mut Vec<Post>) -> Result<(Change, T)>,
        R: FnOnce(&[Post], T) -> T,
    {
        let mut snapshot = self.posts.lock().await;

        let mut working = self
            .store
            .load()
            .await
            .map_err(|e| AppError::storage("loading posts", e))?;
        let (change, outcome) = apply(&mut working)?;

        if let Err(err) = self.store.commit(&working, &change).await {
            log::error!("saving to {} store failed: {err:#}", self.store.kind());
            return Err(AppError::storage("saving posts", err));
        }

        if self.store.reconciles() {
            match self.store.load().await {
                Ok(canonical) => working = canonical,
                Err(err) => log::warn!("reload after write failed, keeping local copy: {err:#}"),
            }
        }

        let outcome = resolve(&working, outcome);
        *snapshot = working;
        Ok(outcome)
    }

    fn fresh_id(&self, taken: impl Fn(&str) -> bool) -> String {
        loop {
            let id = self.identity.new_entity_id();
            if !taken(&id) {
                return id;
            }
        }
    }
}

/// The stored version of a just-created post, which may carry
/// server-assigned fields.
fn canonical_post(posts: &[Post], created: Post) -> Post {
    posts
        .iter()
        .find(|p| p.id == created.id)
        .cloned()
        .unwrap_or(created)
}

fn canonical_reply(posts: &[Post], post_id: &str, created: Reply) -> Reply {
    posts
        .iter()
        .find(|p| p.id == post_id)
        .and_then(|p| p.reply(&created.id))
        .cloned()
        .unwrap_or(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::traits::MockPostStore;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Sequential ids and plain equality, enough for exercising the forum.
    struct CountingIdentity(AtomicU64);

    impl IdentityProvider for CountingIdentity {
        fn new_entity_id(&self) -> String {
            format!("id-{}", self.0.fetch_add(1, Ordering::Relaxed))
        }

        fn derive_creator_id(&self, client_addr: &str) -> String {
            format!("user_{client_addr}")
        }

        fn verify_creator(&self, stored: Option<&str>, supplied: Option<&str>) -> bool {
            matches!((stored, supplied), (Some(a), Some(b)) if a == b)
        }
    }

    fn identity() -> Box<dyn IdentityProvider> {
        Box::new(CountingIdentity(AtomicU64::new(1)))
    }

    async fn forum_with_cap(max_posts: usize) -> Forum {
        Forum::new(Box::new(MemoryStore::new()), identity(), max_posts).await
    }

    fn draft(author: &str, title: &str, content: &str, creator: &str) -> PostDraft {
        PostDraft {
            author: Some(author.into()),
            title: title.into(),
            content: content.into(),
            creator_id: Some(creator.into()),
        }
    }

    fn reply_draft(author: &str, content: &str, creator: &str) -> ReplyDraft {
        ReplyDraft {
            author: Some(author.into()),
            content: content.into(),
            creator_id: Some(creator.into()),
        }
    }

    #[tokio::test]
    async fn create_then_list_includes_exactly_one_new_post() {
        let forum = forum_with_cap(DEFAULT_MAX_POSTS).await;
        let first = forum
            .create_post(draft("Alice", "Hello", "World", "u1"))
            .await
            .unwrap();
        let second = forum
            .create_post(draft("Bob", "Again", "Text", "u2"))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);

        let posts = forum.list_posts().await;
        assert_eq!(posts.len(), 2);
        // Most recent first.
        assert_eq!(posts[0].id, second.id);
        assert_eq!(posts.iter().filter(|p| p.id == first.id).count(), 1);
        assert_eq!(posts[1].title, "Hello");
        assert_eq!(posts[1].content, "World");
    }

    #[tokio::test]
    async fn blank_fields_are_rejected_without_touching_the_store() {
        let forum = forum_with_cap(DEFAULT_MAX_POSTS).await;
        for (title, content) in [("", "body"), ("title", "   "), (" ", "")] {
            let err = forum
                .create_post(draft("Alice", title, content, "u1"))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::ValidationError(_)));
        }
        assert!(forum.list_posts().await.is_empty());
    }

    #[tokio::test]
    async fn blank_author_becomes_anonymous_and_text_is_trimmed() {
        let forum = forum_with_cap(DEFAULT_MAX_POSTS).await;
        let post = forum
            .create_post(draft("  ", "  Hello ", "\tWorld\n", "u1"))
            .await
            .unwrap();
        assert_eq!(post.author, "Anonymous");
        assert_eq!(post.title, "Hello");
        assert_eq!(post.content, "World");
    }

    #[tokio::test]
    async fn deleting_with_the_wrong_creator_is_forbidden() {
        let forum = forum_with_cap(DEFAULT_MAX_POSTS).await;
        let post = forum
            .create_post(draft("Alice", "Hello", "World", "u1"))
            .await
            .unwrap();

        let err = forum.delete_post(&post.id, Some("u2")).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = forum.delete_post(&post.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(forum.list_posts().await.len(), 1);

        forum.delete_post(&post.id, Some("u1")).await.unwrap();
        assert!(forum.list_posts().await.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_missing_post_is_not_found() {
        let forum = forum_with_cap(DEFAULT_MAX_POSTS).await;
        let err = forum.delete_post("nope", Some("u1")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(kind, id) if kind == "post" && id == "nope"));
    }

    #[tokio::test]
    async fn creating_at_the_cap_evicts_exactly_the_oldest() {
        let forum = forum_with_cap(3).await;
        let mut ids = Vec::new();
        for n in 0..3 {
            let post = forum
                .create_post(draft("A", &format!("t{n}"), "c", "u1"))
                .await
                .unwrap();
            ids.push(post.id);
        }
        let newest = forum
            .create_post(draft("A", "t3", "c", "u1"))
            .await
            .unwrap();

        let posts = forum.list_posts().await;
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].id, newest.id);
        assert!(posts.iter().all(|p| p.id != ids[0]));
        assert!(posts.iter().any(|p| p.id == ids[1]));
    }

    #[tokio::test]
    async fn reply_lifecycle_scenario() {
        let forum = forum_with_cap(DEFAULT_MAX_POSTS).await;
        let post = forum
            .create_post(draft("Alice", "Hello", "World", "u1"))
            .await
            .unwrap();
        assert_eq!(forum.list_posts().await.len(), 1);

        let reply = forum
            .add_reply(&post.id, reply_draft("Bob", "Hi", "u2"))
            .await
            .unwrap();
        assert_eq!(reply.content, "Hi");
        let replies = |posts: Vec<Post>| posts[0].replies.len();
        assert_eq!(replies(forum.list_posts().await), 1);

        let err = forum
            .delete_reply(&post.id, &reply.id, Some("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(replies(forum.list_posts().await), 1);

        forum
            .delete_reply(&post.id, &reply.id, Some("u2"))
            .await
            .unwrap();
        assert_eq!(replies(forum.list_posts().await), 0);
    }

    #[tokio::test]
    async fn replies_keep_insertion_order() {
        let forum = forum_with_cap(DEFAULT_MAX_POSTS).await;
        let post = forum
            .create_post(draft("Alice", "Hello", "World", "u1"))
            .await
            .unwrap();
        for text in ["one", "two", "three"] {
            forum
                .add_reply(&post.id, reply_draft("Bob", text, "u2"))
                .await
                .unwrap();
        }
        let contents: Vec<String> = forum.list_posts().await[0]
            .replies
            .iter()
            .map(|r| r.content.clone())
            .collect();
        assert_eq!(contents, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn reply_errors() {
        let forum = forum_with_cap(DEFAULT_MAX_POSTS).await;
        let err = forum
            .add_reply("missing", reply_draft("Bob", "Hi", "u2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(..)));

        let post = forum
            .create_post(draft("Alice", "Hello", "World", "u1"))
            .await
            .unwrap();
        let err = forum
            .add_reply(&post.id, reply_draft("Bob", "  ", "u2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let err = forum
            .delete_reply(&post.id, "missing", Some("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(kind, _) if kind == "reply"));
    }

    #[tokio::test]
    async fn failed_save_leaves_the_snapshot_untouched() {
        let mut store = MockPostStore::new();
        store.expect_kind().return_const(StoreKind::File);
        store.expect_load().returning(|| Ok(Vec::new()));
        store.expect_allocate_post_id().returning(|| Ok(None));
        store
            .expect_commit()
            .returning(|_, _| Err(anyhow::anyhow!("disk full")));
        store.expect_reconciles().return_const(false);

        let forum = Forum::new(Box::new(store), identity(), DEFAULT_MAX_POSTS).await;
        let err = forum
            .create_post(draft("Alice", "Hello", "World", "u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(forum.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn unreadable_store_lists_as_empty() {
        let mut store = MockPostStore::new();
        store.expect_kind().return_const(StoreKind::Remote);
        store
            .expect_load()
            .returning(|| Err(anyhow::anyhow!("unreachable")));

        let forum = Forum::new(Box::new(store), identity(), DEFAULT_MAX_POSTS).await;
        assert!(forum.list_posts().await.is_empty());
    }

    #[tokio::test]
    async fn reconciling_store_returns_the_reloaded_post() {
        let mut store = MockPostStore::new();
        let canonical = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut loads = 0;
        store.expect_kind().return_const(StoreKind::Remote);
        store.expect_allocate_post_id().returning(|| Ok(None));
        store.expect_reconciles().return_const(true);
        store
            .expect_commit()
            .withf(|posts, change| posts.len() == 1 && matches!(change, Change::InsertPost { .. }))
            .returning(|_, _| Ok(()));
        store.expect_load().returning(move || {
            loads += 1;
            // Initial refresh and the pre-write load see an empty table.
            if loads <= 2 {
                return Ok(Vec::new());
            }
            Ok(vec![Post {
                id: "id-1".into(),
                author: "Alice".into(),
                title: "Hello".into(),
                content: "World".into(),
                created_at: canonical,
                creator_id: Some("u1".into()),
                replies: Vec::new(),
            }])
        });

        let forum = Forum::new(Box::new(store), identity(), DEFAULT_MAX_POSTS).await;
        let post = forum
            .create_post(draft("Alice", "Hello", "World", "u1"))
            .await
            .unwrap();
        assert_eq!(post.created_at, canonical);
    }

    #[tokio::test]
    async fn reconciling_store_returns_the_reloaded_reply() {
        let canonical = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:05:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let parent = Post {
            id: "p1".into(),
            author: "Alice".into(),
            title: "Hello".into(),
            content: "World".into(),
            created_at: Utc::now(),
            creator_id: Some("u1".into()),
            replies: Vec::new(),
        };
        let mut store = MockPostStore::new();
        let mut loads = 0;
        store.expect_kind().return_const(StoreKind::Remote);
        store.expect_reconciles().return_const(true);
        store.expect_commit().returning(|_, _| Ok(()));
        store.expect_load().returning(move || {
            loads += 1;
            let mut post = parent.clone();
            if loads > 2 {
                post.replies.push(Reply {
                    id: "id-1".into(),
                    author: "Bob".into(),
                    content: "Hi".into(),
                    created_at: canonical,
                    creator_id: Some("u2".into()),
                });
            }
            Ok(vec![post])
        });

        let forum = Forum::new(Box::new(store), identity(), DEFAULT_MAX_POSTS).await;
        let reply = forum
            .add_reply(
                "p1",
                ReplyDraft {
                    author: Some("Bob".into()),
                    content: "Hi".into(),
                    creator_id: Some("u2".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.created_at, canonical);
        assert_eq!(forum.snapshot().await[0].replies[0].created_at, canonical);
    }

    /// Hands out its contents, then parks the next armed load until released.
    struct GatedStore {
        inner: MemoryStore,
        gate: Arc<Gate>,
    }

    #[derive(Default)]
    struct Gate {
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl PostStore for GatedStore {
        fn kind(&self) -> StoreKind {
            StoreKind::Memory
        }

        async fn load(&self) -> anyhow::Result<Vec<Post>> {
            let posts = self.inner.load().await?;
            if self.gate.armed.swap(false, Ordering::SeqCst) {
                self.gate.entered.notify_one();
                self.gate.release.notified().await;
            }
            Ok(posts)
        }

        async fn save(&self, posts: &[Post]) -> anyhow::Result<()> {
            self.inner.save(posts).await
        }
    }

    #[tokio::test]
    async fn slow_reload_does_not_hide_a_concurrent_write() {
        let gate = Arc::new(Gate::default());
        let store = GatedStore {
            inner: MemoryStore::new(),
            gate: gate.clone(),
        };
        let forum = Arc::new(Forum::new(Box::new(store), identity(), DEFAULT_MAX_POSTS).await);

        gate.armed.store(true, Ordering::SeqCst);
        let reload = tokio::spawn({
            let forum = forum.clone();
            async move { forum.list_posts().await }
        });
        // The reload has read the (empty) collection and is parked.
        gate.entered.notified().await;

        let create = tokio::spawn({
            let forum = forum.clone();
            async move { forum.create_post(draft("Alice", "Hello", "World", "u1")).await }
        });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        gate.release.notify_one();

        reload.await.unwrap();
        let created = create.await.unwrap().unwrap();
        let snapshot = forum.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, created.id);
    }
}
