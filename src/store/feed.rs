// SPDX-License-Identifier: MPL-2.0

use crate::backend::{NewPost, Post, Query, RemoteService, from_record, to_record};
use crate::config::{ANONYMOUS_AUTHOR, POSTS_TABLE};
use crate::store::{SessionController, StoreError, bounded};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// What the feed screen renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    /// Newest first
    pub posts: Vec<Post>,
    /// Compose box contents
    pub draft: String,
    pub loading: bool,
    pub posting: bool,
    pub error: Option<StoreError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { count: usize },
    /// A newer refresh was issued while this one was in flight
    Superseded,
    /// The session changed while this one was in flight
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank caption, nothing sent
    Ignored,
    Posted,
}

pub struct FeedStore {
    remote: Arc<dyn RemoteService>,
    session: Arc<SessionController>,
    request_timeout: Duration,
    state: RwLock<FeedSnapshot>,
    /// Sequence number of the most recently issued refresh
    issued: AtomicU64,
}

impl FeedStore {
    pub fn new(
        remote: Arc<dyn RemoteService>,
        session: Arc<SessionController>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            remote,
            session,
            request_timeout,
            state: RwLock::new(FeedSnapshot::default()),
            issued: AtomicU64::new(0),
        }
    }

    fn state(&self) -> RwLockWriteGuard<'_, FeedSnapshot> {
        self.state.write().expect("feed state lock poisoned")
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.state.read().expect("feed state lock poisoned").clone()
    }

    pub fn set_draft(&self, text: &str) {
        self.state().draft = text.to_string();
    }

    pub fn dismiss_error(&self) {
        self.state().error = None;
    }

    /// Forget everything, including refreshes still in flight.
    pub fn reset(&self) {
        self.issued.fetch_add(1, Ordering::SeqCst);
        *self.state() = FeedSnapshot::default();
    }

    /// Replace the whole list with the service's current posts.
    ///
    /// Only the most recently issued refresh may write its result; an older
    /// one that finishes late is dropped. A failed refresh keeps the
    /// previous list.
    pub async fn refresh(&self) -> Result<RefreshOutcome, StoreError> {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = self.session.epoch();
        self.state().loading = true;

        let query = Query::table(POSTS_TABLE).order_by("created_at", false);
        let result = bounded(self.request_timeout, self.remote.query_records(&query))
            .await
            .and_then(|rows| rows.into_iter().map(from_record).collect::<Result<Vec<Post>, _>>());

        let mut state = self.state();
        let latest = seq == self.issued.load(Ordering::SeqCst);
        if latest {
            state.loading = false;
        }
        if !self.session.is_current(epoch) {
            debug!(seq, "session changed, dropping feed refresh");
            return Ok(RefreshOutcome::Discarded);
        }
        if !latest {
            debug!(seq, "newer refresh issued, dropping feed refresh");
            return Ok(RefreshOutcome::Superseded);
        }

        match result {
            Ok(posts) => {
                state.posts = newest_first(posts);
                state.error = None;
                Ok(RefreshOutcome::Applied {
                    count: state.posts.len(),
                })
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch posts");
                let err = StoreError::from(e);
                state.error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Publish `caption` as the signed-in user, then re-fetch the feed.
    ///
    /// The echoed row is shown right away and the following refresh replaces
    /// it with the authoritative list.
    pub async fn submit_post(&self, caption: &str) -> Result<SubmitOutcome, StoreError> {
        let caption = caption.trim();
        if caption.is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }

        let Some(session) = self.session.current() else {
            self.state().error = Some(StoreError::Unauthenticated);
            return Err(StoreError::Unauthenticated);
        };
        let epoch = self.session.epoch();

        let author = session
            .email
            .as_deref()
            .filter(|email| !email.is_empty())
            .unwrap_or(ANONYMOUS_AUTHOR);
        let record = to_record(&NewPost::new(caption, &session.identity(), author))?;

        self.state().posting = true;
        let result = bounded(
            self.request_timeout,
            self.remote.insert_record(POSTS_TABLE, record),
        )
        .await;

        {
            let mut state = self.state();
            state.posting = false;
            if !self.session.is_current(epoch) {
                debug!("session changed, dropping post confirmation");
                return Ok(SubmitOutcome::Posted);
            }

            match result {
                Ok(row) => {
                    state.draft.clear();
                    state.error = None;
                    match from_record::<Post>(row) {
                        Ok(post) => splice(&mut state.posts, post),
                        Err(e) => debug!(error = %e, "inserted row not shown until refresh"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to publish post");
                    let err = StoreError::from(e);
                    state.error = Some(err.clone());
                    return Err(err);
                }
            }
        }

        // Failure here is already recorded in the snapshot.
        let _ = self.refresh().await;
        Ok(SubmitOutcome::Posted)
    }
}

/// Sort newest first and keep one entry per post id.
fn newest_first(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let mut seen = HashSet::new();
    posts.retain(|p| seen.insert(p.id.clone()));
    posts
}

/// Insert a freshly created post in order unless the list already has it.
fn splice(posts: &mut Vec<Post>, post: Post) {
    if posts.iter().any(|p| p.id == post.id) {
        return;
    }
    let index = posts
        .iter()
        .position(|p| p.created_at < post.created_at)
        .unwrap_or(posts.len());
    posts.insert(index, post);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, MemoryBackend};
    use crate::store::testing::{GatedBackend, post_row};

    const T1: &str = "2024-05-01T10:00:00Z";
    const T2: &str = "2024-05-01T11:00:00Z";
    const T3: &str = "2024-05-01T12:00:00Z";

    fn store(remote: Arc<dyn RemoteService>) -> FeedStore {
        let session = Arc::new(SessionController::new(
            Arc::clone(&remote),
            Duration::from_secs(5),
            Duration::from_secs(5),
        ));
        FeedStore::new(remote, session, Duration::from_secs(5))
    }

    async fn signed_in(backend: Arc<MemoryBackend>) -> FeedStore {
        backend.add_account("a@example.com", "pw");
        let feed = store(backend);
        feed.session.login("a@example.com", "pw").await.unwrap();
        feed
    }

    fn ids(feed: &FeedStore) -> Vec<String> {
        feed.snapshot().posts.into_iter().map(|p| p.id).collect()
    }

    #[tokio::test]
    async fn test_refresh_orders_newest_first() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(POSTS_TABLE, post_row(2, "yo", T1));
        backend.seed(POSTS_TABLE, post_row(1, "hi", T2));
        let feed = store(backend);

        let outcome = feed.refresh().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Applied { count: 2 });
        assert_eq!(ids(&feed), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_refresh_sorts_even_if_service_does_not() {
        let backend = Arc::new(GatedBackend::new());
        let gate = backend.gate();
        gate.send(Ok(vec![post_row(2, "yo", T1), post_row(1, "hi", T2)]))
            .unwrap();
        let feed = store(backend);

        feed.refresh().await.unwrap();
        assert_eq!(ids(&feed), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_refresh_replaces_instead_of_merging() {
        let backend = Arc::new(GatedBackend::new());
        let feed = store(Arc::clone(&backend) as Arc<dyn RemoteService>);

        backend
            .gate()
            .send(Ok(vec![post_row(1, "old", T1), post_row(2, "gone", T2)]))
            .unwrap();
        feed.refresh().await.unwrap();

        backend.gate().send(Ok(vec![post_row(3, "new", T3)])).unwrap();
        feed.refresh().await.unwrap();
        assert_eq!(ids(&feed), vec!["3"]);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_list() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(POSTS_TABLE, post_row(1, "hi", T1));
        let feed = store(Arc::clone(&backend) as Arc<dyn RemoteService>);
        feed.refresh().await.unwrap();

        backend.fail_next(BackendError::Network("offline".into()));
        let result = feed.refresh().await;

        assert!(matches!(result, Err(StoreError::Network(_))));
        let snapshot = feed.snapshot();
        assert_eq!(snapshot.posts.len(), 1);
        assert!(!snapshot.loading);
        assert!(snapshot.error.as_ref().is_some_and(|e| e.is_retryable()));
    }

    #[tokio::test]
    async fn test_refresh_that_never_answers_times_out() {
        tokio::time::pause();
        let backend = Arc::new(GatedBackend::new());
        let _unanswered = backend.gate();
        let feed = store(Arc::clone(&backend) as Arc<dyn RemoteService>);

        let result = feed.refresh().await;

        assert!(matches!(result, Err(StoreError::Timeout)));
        let snapshot = feed.snapshot();
        assert!(!snapshot.loading);
        assert!(snapshot.posts.is_empty());
        assert!(snapshot.error.as_ref().is_some_and(|e| e.is_retryable()));
    }

    #[tokio::test]
    async fn test_late_older_refresh_does_not_overwrite_newer() {
        let backend = Arc::new(GatedBackend::new());
        let first = backend.gate();
        let second = backend.gate();
        let feed = store(Arc::clone(&backend) as Arc<dyn RemoteService>);

        let driver = async {
            tokio::task::yield_now().await;
            second.send(Ok(vec![post_row(2, "fresh", T2)])).unwrap();
            tokio::task::yield_now().await;
            first.send(Ok(vec![post_row(1, "stale", T1)])).unwrap();
        };
        let (older, newer, ()) = tokio::join!(feed.refresh(), feed.refresh(), driver);

        assert_eq!(older.unwrap(), RefreshOutcome::Superseded);
        assert_eq!(newer.unwrap(), RefreshOutcome::Applied { count: 1 });
        assert_eq!(ids(&feed), vec!["2"]);
        assert!(!feed.snapshot().loading);
    }

    #[tokio::test]
    async fn test_older_refresh_finishing_first_is_not_applied() {
        let backend = Arc::new(GatedBackend::new());
        let first = backend.gate();
        let second = backend.gate();
        let feed = store(Arc::clone(&backend) as Arc<dyn RemoteService>);

        let driver = async {
            tokio::task::yield_now().await;
            first.send(Ok(vec![post_row(1, "stale", T1)])).unwrap();
            tokio::task::yield_now().await;
            second.send(Ok(vec![post_row(2, "fresh", T2)])).unwrap();
        };
        let (older, _, ()) = tokio::join!(feed.refresh(), feed.refresh(), driver);

        assert_eq!(older.unwrap(), RefreshOutcome::Superseded);
        assert_eq!(ids(&feed), vec!["2"]);
    }

    #[tokio::test]
    async fn test_blank_caption_makes_no_call() {
        let backend = Arc::new(MemoryBackend::new());
        let feed = signed_in(Arc::clone(&backend)).await;
        let calls = backend.call_count();

        assert_eq!(feed.submit_post("").await, Ok(SubmitOutcome::Ignored));
        assert_eq!(feed.submit_post("   ").await, Ok(SubmitOutcome::Ignored));
        assert_eq!(backend.call_count(), calls);
        assert!(feed.snapshot().posts.is_empty());
    }

    #[tokio::test]
    async fn test_submit_without_session_is_unauthenticated() {
        let backend = Arc::new(MemoryBackend::new());
        let feed = store(Arc::clone(&backend) as Arc<dyn RemoteService>);

        let result = feed.submit_post("hello").await;
        assert_eq!(result, Err(StoreError::Unauthenticated));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_clears_draft_and_shows_post_once() {
        let backend = Arc::new(MemoryBackend::new());
        let feed = signed_in(Arc::clone(&backend)).await;
        feed.set_draft("first post");

        let outcome = feed.submit_post("first post").await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Posted);

        let snapshot = feed.snapshot();
        assert_eq!(snapshot.draft, "");
        assert_eq!(snapshot.posts.len(), 1);
        assert_eq!(snapshot.posts[0].caption, "first post");
        assert_eq!(snapshot.posts[0].author_display_name, "a@example.com");
        assert_eq!(backend.rows(POSTS_TABLE).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_submit_keeps_draft() {
        let backend = Arc::new(MemoryBackend::new());
        let feed = signed_in(Arc::clone(&backend)).await;
        feed.set_draft("hello");

        backend.fail_next(BackendError::Network("offline".into()));
        assert!(feed.submit_post("hello").await.is_err());

        let snapshot = feed.snapshot();
        assert_eq!(snapshot.draft, "hello");
        assert!(!snapshot.posting);
        assert!(snapshot.error.is_some());
    }

    #[tokio::test]
    async fn test_refresh_after_sign_out_is_discarded() {
        let backend = Arc::new(GatedBackend::new());
        backend.inner.add_account("a@example.com", "pw");
        let gate = backend.gate();
        let feed = store(Arc::clone(&backend) as Arc<dyn RemoteService>);
        feed.session.login("a@example.com", "pw").await.unwrap();

        let driver = async {
            tokio::task::yield_now().await;
            feed.session.sign_out().await;
            feed.reset();
            gate.send(Ok(vec![post_row(1, "private", T1)])).unwrap();
        };
        let (outcome, ()) = tokio::join!(feed.refresh(), driver);

        assert_eq!(outcome.unwrap(), RefreshOutcome::Discarded);
        assert!(feed.snapshot().posts.is_empty());
    }

    #[test]
    fn test_splice_skips_known_ids_and_keeps_order() {
        let parse = |row| from_record::<Post>(row).unwrap();
        let mut posts = vec![parse(post_row(3, "c", T3)), parse(post_row(1, "a", T1))];

        splice(&mut posts, parse(post_row(2, "b", T2)));
        splice(&mut posts, parse(post_row(3, "c", T3)));

        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
    }
}
