// SPDX-License-Identifier: MPL-2.0

//! Client-side state for the session, the feed and the profile editor.
//!
//! Stores catch every remote failure and turn it into a [`StoreError`] kept
//! in their snapshot, so the view can show it and offer a retry. Results that
//! arrive after a newer request or after a sign-out are discarded.

mod feed;
mod profile;
mod session;

pub use feed::{FeedSnapshot, FeedStore, RefreshOutcome, SubmitOutcome};
pub use profile::{ProfileSnapshot, ProfileStore};
pub use session::{Entry, SessionController, SignOutOutcome, Startup, SubscriptionHandle};

use crate::backend::{BackendError, RemoteService};
use crate::state::AppSettings;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A required field is missing; nothing was sent
    #[error("{0}")]
    Validation(String),
    #[error("not signed in")]
    Unauthenticated,
    #[error("{0}")]
    Auth(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Remote(String),
}

impl StoreError {
    /// Worth offering the user a retry (pull to refresh, tap again)
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Network(_) | StoreError::Timeout)
    }
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Auth(message) => StoreError::Auth(message),
            BackendError::Network(message) => StoreError::Network(message),
            BackendError::Timeout => StoreError::Timeout,
            BackendError::NotAuthenticated => StoreError::Unauthenticated,
            BackendError::NotFound => StoreError::Remote("not found".to_string()),
            BackendError::Rejected { message, .. } => StoreError::Remote(message),
            BackendError::InvalidResponse(message) => StoreError::Remote(message),
        }
    }
}

/// Run a remote call with an upper bound on how long it may take.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout),
    }
}

/// The three stores wired to one backend.
#[derive(Clone)]
pub struct Stores {
    pub session: Arc<SessionController>,
    pub feed: Arc<FeedStore>,
    pub profile: Arc<ProfileStore>,
}

impl Stores {
    pub fn new(remote: Arc<dyn RemoteService>, settings: &AppSettings) -> Self {
        let session = Arc::new(SessionController::new(
            Arc::clone(&remote),
            settings.request_timeout(),
            settings.startup_timeout(),
        ));
        let feed = Arc::new(FeedStore::new(
            Arc::clone(&remote),
            Arc::clone(&session),
            settings.request_timeout(),
        ));
        let profile = Arc::new(ProfileStore::new(
            remote,
            Arc::clone(&session),
            settings.request_timeout(),
        ));
        Self {
            session,
            feed,
            profile,
        }
    }

    /// Sign out and drop everything the stores hold for the old session.
    pub async fn sign_out(&self) -> SignOutOutcome {
        let outcome = self.profile.sign_out().await;
        self.feed.reset();
        outcome
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::backend::{
        AuthSubscription, BackendError, MemoryBackend, Query, Record, RemoteService, Session,
        UserIdentity,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::oneshot;

    type Gate = oneshot::Receiver<Result<Vec<Record>, BackendError>>;

    /// Memory backend whose queries wait for the test to hand them a result.
    ///
    /// Each `gate()` call reserves the response for the next query issued;
    /// queries beyond the reserved gates go straight to the memory backend.
    pub struct GatedBackend {
        pub inner: MemoryBackend,
        gates: Mutex<VecDeque<Gate>>,
        echo: Mutex<Option<Record>>,
        stall_session: AtomicBool,
    }

    impl GatedBackend {
        pub fn new() -> Self {
            Self {
                inner: MemoryBackend::new(),
                gates: Mutex::new(VecDeque::new()),
                echo: Mutex::new(None),
                stall_session: AtomicBool::new(false),
            }
        }

        /// Session lookups never answer from now on
        pub fn stall_session(&self) {
            self.stall_session.store(true, Ordering::SeqCst);
        }

        /// Answer upserts with `record` instead of the stored row
        pub fn override_echo(&self, record: Record) {
            *self.echo.lock().unwrap() = Some(record);
        }

        pub fn gate(&self) -> oneshot::Sender<Result<Vec<Record>, BackendError>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().push_back(rx);
            tx
        }
    }

    #[async_trait]
    impl RemoteService for GatedBackend {
        async fn authenticate(&self, email: &str, password: &str) -> Result<Session, BackendError> {
            self.inner.authenticate(email, password).await
        }

        async fn register(
            &self,
            email: &str,
            password: &str,
        ) -> Result<UserIdentity, BackendError> {
            self.inner.register(email, password).await
        }

        async fn current_session(&self) -> Result<Option<Session>, BackendError> {
            if self.stall_session.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.inner.current_session().await
        }

        async fn current_user(&self) -> Result<Option<UserIdentity>, BackendError> {
            self.inner.current_user().await
        }

        async fn sign_out(&self) -> Result<(), BackendError> {
            self.inner.sign_out().await
        }

        fn subscribe(&self) -> AuthSubscription {
            self.inner.subscribe()
        }

        fn auth_generation(&self) -> u64 {
            self.inner.auth_generation()
        }

        async fn query_records(&self, query: &Query) -> Result<Vec<Record>, BackendError> {
            let gate = self.gates.lock().unwrap().pop_front();
            match gate {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(BackendError::Network("gate dropped".into()))),
                None => self.inner.query_records(query).await,
            }
        }

        async fn insert_record(&self, table: &str, record: Record) -> Result<Record, BackendError> {
            self.inner.insert_record(table, record).await
        }

        async fn upsert_record(
            &self,
            table: &str,
            record: Record,
            conflict_key: &str,
        ) -> Result<Record, BackendError> {
            let stored = self.inner.upsert_record(table, record, conflict_key).await?;
            let echo = self.echo.lock().unwrap().clone();
            Ok(echo.unwrap_or(stored))
        }
    }

    pub fn row(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    pub fn post_row(id: u64, caption: &str, created_at: &str) -> Record {
        row(serde_json::json!({
            "id": id,
            "caption": caption,
            "likes": 0,
            "comments": 0,
            "reposts": 0,
            "user_id": "user-1",
            "username": "a@example.com",
            "created_at": created_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_map_to_store_taxonomy() {
        assert_eq!(
            StoreError::from(BackendError::NotAuthenticated),
            StoreError::Unauthenticated
        );
        assert!(StoreError::from(BackendError::Timeout).is_retryable());
        assert!(StoreError::from(BackendError::Network("reset".into())).is_retryable());
        assert!(!StoreError::from(BackendError::Auth("bad".into())).is_retryable());
    }

    #[tokio::test]
    async fn test_bounded_turns_expiry_into_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), BackendError>(())
        };
        let result = bounded(Duration::from_millis(10), slow).await;
        assert_eq!(result, Err(BackendError::Timeout));
    }
}
