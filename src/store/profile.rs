// SPDX-License-Identifier: MPL-2.0

use crate::backend::{BackendError, Profile, Query, RemoteService, from_record, to_record};
use crate::config::{PROFILE_CONFLICT_KEY, PROFILES_TABLE};
use crate::store::{SessionController, SignOutOutcome, StoreError, bounded};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSnapshot {
    /// `None` until loaded, and again after sign-out
    pub profile: Option<Profile>,
    pub loading: bool,
    pub saving: bool,
    pub error: Option<StoreError>,
}

/// The signed-in user's profile row.
pub struct ProfileStore {
    remote: Arc<dyn RemoteService>,
    session: Arc<SessionController>,
    request_timeout: Duration,
    state: RwLock<ProfileSnapshot>,
    /// Shared by loads and saves: only the latest may write the snapshot
    issued: AtomicU64,
}

impl ProfileStore {
    pub fn new(
        remote: Arc<dyn RemoteService>,
        session: Arc<SessionController>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            remote,
            session,
            request_timeout,
            state: RwLock::new(ProfileSnapshot::default()),
            issued: AtomicU64::new(0),
        }
    }

    fn state(&self) -> RwLockWriteGuard<'_, ProfileSnapshot> {
        self.state.write().expect("profile state lock poisoned")
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        self.state.read().expect("profile state lock poisoned").clone()
    }

    pub fn dismiss_error(&self) {
        self.state().error = None;
    }

    fn reset(&self) {
        self.issued.fetch_add(1, Ordering::SeqCst);
        *self.state() = ProfileSnapshot::default();
    }

    fn fail_unauthenticated(&self) -> StoreError {
        let mut state = self.state();
        state.profile = None;
        state.error = Some(StoreError::Unauthenticated);
        StoreError::Unauthenticated
    }

    /// Fetch the current user's profile. A user who never saved one gets an
    /// empty profile, not an error.
    pub async fn load(&self) -> Result<Profile, StoreError> {
        let Some(session) = self.session.current() else {
            return Err(self.fail_unauthenticated());
        };
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = self.session.epoch();
        self.state().loading = true;

        let query = Query::table(PROFILES_TABLE)
            .eq("user_id", session.user_id.as_str())
            .single();
        let result = bounded(self.request_timeout, self.remote.query_records(&query)).await;

        let loaded = match result {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => from_record::<Profile>(row).map_err(StoreError::from),
                None => Ok(Profile::empty(&session.user_id)),
            },
            Err(BackendError::NotFound) => {
                debug!("no profile row yet");
                Ok(Profile::empty(&session.user_id))
            }
            Err(e) => Err(StoreError::from(e)),
        };

        let mut state = self.state();
        if !self.finish(&mut state, seq, epoch) {
            return loaded;
        }

        match loaded {
            Ok(profile) => {
                state.profile = Some(profile.clone());
                state.error = None;
                Ok(profile)
            }
            Err(e) => {
                warn!(error = %e, "failed to load profile");
                state.error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Insert or overwrite the current user's row. The row is always keyed
    /// by the signed-in user, whatever `profile.user_id` says.
    pub async fn save(&self, profile: Profile) -> Result<Profile, StoreError> {
        let Some(session) = self.session.current() else {
            return Err(self.fail_unauthenticated());
        };
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = self.session.epoch();

        let sent = Profile {
            user_id: session.user_id.clone(),
            updated_at: Some(Utc::now()),
            ..profile
        };
        let record = to_record(&sent)?;

        self.state().saving = true;
        let result = bounded(
            self.request_timeout,
            self.remote
                .upsert_record(PROFILES_TABLE, record, PROFILE_CONFLICT_KEY),
        )
        .await;

        // The service's echo wins over what we sent.
        let saved = result.map_err(StoreError::from).map(|row| {
            from_record::<Profile>(row).unwrap_or_else(|e| {
                debug!(error = %e, "unreadable upsert echo, keeping sent profile");
                sent.clone()
            })
        });

        let mut state = self.state();
        if !self.finish(&mut state, seq, epoch) {
            return saved;
        }

        match saved {
            Ok(profile) => {
                info!(user_id = %profile.user_id, "profile saved");
                state.profile = Some(profile.clone());
                state.error = None;
                Ok(profile)
            }
            Err(e) => {
                warn!(error = %e, "failed to save profile");
                state.error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Resolve in-flight flags and report whether request `seq` may write.
    fn finish(&self, state: &mut ProfileSnapshot, seq: u64, epoch: u64) -> bool {
        let latest = seq == self.issued.load(Ordering::SeqCst);
        if latest {
            state.loading = false;
            state.saving = false;
        }
        if !self.session.is_current(epoch) {
            debug!(seq, "session changed, dropping profile result");
            return false;
        }
        if !latest {
            debug!(seq, "newer profile request issued, dropping result");
        }
        latest
    }

    /// End the session and forget the profile. The caller navigates to the
    /// login screen afterwards; calling this while signed out does nothing.
    pub async fn sign_out(&self) -> SignOutOutcome {
        let outcome = self.session.sign_out().await;
        self.reset();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::store::testing::{GatedBackend, row};
    use serde_json::json;

    fn store(remote: Arc<dyn RemoteService>) -> ProfileStore {
        let session = Arc::new(SessionController::new(
            Arc::clone(&remote),
            Duration::from_secs(5),
            Duration::from_secs(5),
        ));
        ProfileStore::new(remote, session, Duration::from_secs(5))
    }

    async fn signed_in(backend: Arc<MemoryBackend>) -> (ProfileStore, String) {
        let user_id = backend.add_account("a@example.com", "pw");
        let profile = store(backend);
        profile.session.login("a@example.com", "pw").await.unwrap();
        (profile, user_id)
    }

    fn edited(username: &str, bio: &str) -> Profile {
        Profile {
            user_id: "ignored".into(),
            username: username.into(),
            bio: bio.into(),
            avatar_url: String::new(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_missing_row_loads_empty_profile() {
        let backend = Arc::new(MemoryBackend::new());
        let (profile, user_id) = signed_in(backend).await;

        let loaded = profile.load().await.unwrap();
        assert_eq!(loaded, Profile::empty(&user_id));

        let snapshot = profile.snapshot();
        assert!(snapshot.error.is_none());
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_other_load_failure_is_an_error_state() {
        let backend = Arc::new(MemoryBackend::new());
        let (profile, _) = signed_in(Arc::clone(&backend)).await;

        backend.fail_next(BackendError::Rejected {
            code: "42501".into(),
            message: "permission denied".into(),
        });
        let result = profile.load().await;

        assert_eq!(result, Err(StoreError::Remote("permission denied".into())));
        assert!(profile.snapshot().error.is_some());
        assert!(!profile.snapshot().loading);
    }

    #[tokio::test]
    async fn test_save_twice_keeps_one_row() {
        let backend = Arc::new(MemoryBackend::new());
        let (profile, user_id) = signed_in(Arc::clone(&backend)).await;

        profile.save(edited("ana", "hello")).await.unwrap();
        profile.save(edited("ana", "hello")).await.unwrap();

        assert_eq!(backend.rows(PROFILES_TABLE).len(), 1);
        let loaded = profile.load().await.unwrap();
        assert_eq!(loaded.user_id, user_id);
        assert_eq!(loaded.username, "ana");
        assert_eq!(loaded.bio, "hello");
    }

    #[tokio::test]
    async fn test_save_stamps_time_and_forces_user_id() {
        let backend = Arc::new(MemoryBackend::new());
        let (profile, user_id) = signed_in(Arc::clone(&backend)).await;

        let before = Utc::now();
        let saved = profile.save(edited("ana", "")).await.unwrap();

        assert_eq!(saved.user_id, user_id);
        assert!(saved.updated_at.is_some_and(|at| at >= before));
        assert_eq!(backend.rows(PROFILES_TABLE)[0]["user_id"], json!(user_id));
    }

    #[tokio::test]
    async fn test_echoed_row_wins_over_sent_values() {
        let backend = Arc::new(GatedBackend::new());
        let user_id = backend.inner.add_account("a@example.com", "pw");
        let profile = store(Arc::clone(&backend) as Arc<dyn RemoteService>);
        profile.session.login("a@example.com", "pw").await.unwrap();
        backend.override_echo(row(json!({
            "user_id": user_id,
            "username": "ana",
            "bio": "hello",
            "avatar_url": "https://cdn.example.com/default.png",
            "updated_at": "2024-05-01T10:00:00Z"
        })));

        let saved = profile.save(edited("ana", "hello")).await.unwrap();

        assert_eq!(saved.avatar_url, "https://cdn.example.com/default.png");
        assert_eq!(profile.snapshot().profile, Some(saved));
    }

    #[tokio::test]
    async fn test_sent_values_kept_when_service_does_not_change_them() {
        let backend = Arc::new(MemoryBackend::new());
        let (profile, _) = signed_in(backend).await;

        let saved = profile.save(edited("ana", "hello")).await.unwrap();
        assert_eq!(saved.username, "ana");
        assert_eq!(saved.bio, "hello");
        assert_eq!(saved.avatar_url, "");
    }

    #[tokio::test]
    async fn test_save_without_session_is_unauthenticated() {
        let backend = Arc::new(MemoryBackend::new());
        let profile = store(Arc::clone(&backend) as Arc<dyn RemoteService>);

        let result = profile.save(edited("ana", "")).await;
        assert_eq!(result, Err(StoreError::Unauthenticated));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_load_after_sign_out_is_unauthenticated() {
        let backend = Arc::new(MemoryBackend::new());
        let (profile, _) = signed_in(Arc::clone(&backend)).await;
        profile.save(edited("ana", "hello")).await.unwrap();
        profile.load().await.unwrap();

        assert_eq!(profile.sign_out().await, SignOutOutcome::SignedOut);
        assert_eq!(profile.snapshot().profile, None);

        assert_eq!(profile.load().await, Err(StoreError::Unauthenticated));
        assert_eq!(profile.snapshot().profile, None);
    }

    #[tokio::test]
    async fn test_sign_out_twice_is_a_no_op() {
        let backend = Arc::new(MemoryBackend::new());
        let (profile, _) = signed_in(backend).await;

        assert_eq!(profile.sign_out().await, SignOutOutcome::SignedOut);
        assert_eq!(profile.sign_out().await, SignOutOutcome::AlreadySignedOut);
    }

    #[tokio::test]
    async fn test_load_finishing_after_sign_out_is_dropped() {
        let backend = Arc::new(GatedBackend::new());
        let user_id = backend.inner.add_account("a@example.com", "pw");
        let gate = backend.gate();
        let profile = store(Arc::clone(&backend) as Arc<dyn RemoteService>);
        profile.session.login("a@example.com", "pw").await.unwrap();

        let driver = async {
            tokio::task::yield_now().await;
            profile.sign_out().await;
            gate.send(Ok(vec![row(json!({ "user_id": user_id, "username": "ana" }))]))
                .unwrap();
        };
        let (_, ()) = tokio::join!(profile.load(), driver);

        let snapshot = profile.snapshot();
        assert_eq!(snapshot.profile, None);
        assert!(!snapshot.loading);
    }
}
