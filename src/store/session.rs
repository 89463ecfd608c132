// SPDX-License-Identifier: MPL-2.0

use crate::backend::{AuthEvent, RemoteService, Session, UserIdentity};
use crate::store::{StoreError, bounded};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Which screen the app opens on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Home,
    Login,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Startup {
    pub session: Option<Session>,
    pub entry: Entry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutOutcome {
    SignedOut,
    AlreadySignedOut,
}

/// The one session this client holds, plus an epoch that changes whenever
/// the signed-in user does. Requests remember the epoch they started in.
#[derive(Default)]
struct SessionCell {
    slot: RwLock<Slot>,
    epoch: AtomicU64,
}

#[derive(Default)]
struct Slot {
    session: Option<Session>,
    /// Auth events numbered at or below this were queued before the last
    /// local transition and no longer describe this client.
    floor: u64,
}

impl SessionCell {
    fn current(&self) -> Option<Session> {
        self.slot
            .read()
            .expect("session lock poisoned")
            .session
            .clone()
    }

    /// Install a session obtained locally, superseding events up to `floor`.
    fn set(&self, session: Session, floor: u64) {
        let mut slot = self.slot.write().expect("session lock poisoned");
        slot.floor = slot.floor.max(floor);
        self.replace(&mut slot, Some(session));
    }

    /// Drop the session locally, superseding events up to `floor`.
    fn clear(&self, floor: u64) -> bool {
        let mut slot = self.slot.write().expect("session lock poisoned");
        slot.floor = slot.floor.max(floor);
        self.replace(&mut slot, None)
    }

    /// Follow a backend event. Returns false when the event is stale.
    fn apply(&self, seq: u64, event: &AuthEvent) -> bool {
        let mut slot = self.slot.write().expect("session lock poisoned");
        if seq <= slot.floor {
            return false;
        }
        slot.floor = seq;
        self.replace(&mut slot, event.session().cloned());
        true
    }

    /// Returns whether a session was held before.
    fn replace(&self, slot: &mut Slot, session: Option<Session>) -> bool {
        let same_user = match (&slot.session, &session) {
            (Some(old), Some(new)) => old.user_id == new.user_id,
            (None, None) => true,
            _ => false,
        };
        if !same_user {
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        std::mem::replace(&mut slot.session, session).is_some()
    }
}

/// Registered auth listener. Dropping it stops the listener; `unsubscribe`
/// also waits until it has stopped.
pub struct SubscriptionHandle {
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub async fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Owns the authentication session and reports its transitions.
pub struct SessionController {
    remote: Arc<dyn RemoteService>,
    cell: Arc<SessionCell>,
    entry: OnceLock<Entry>,
    request_timeout: Duration,
    startup_timeout: Duration,
}

impl SessionController {
    pub fn new(
        remote: Arc<dyn RemoteService>,
        request_timeout: Duration,
        startup_timeout: Duration,
    ) -> Self {
        Self {
            remote,
            cell: Arc::new(SessionCell::default()),
            entry: OnceLock::new(),
            request_timeout,
            startup_timeout,
        }
    }

    /// Look for a session left by a previous run. Failure or a slow service
    /// counts as "no session" so startup lands on the login screen.
    ///
    /// The entry screen is decided by the first call; later calls report the
    /// same entry.
    pub async fn initialize(&self) -> Startup {
        let session = match bounded(self.startup_timeout, self.remote.current_session()).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "could not restore session, starting signed out");
                None
            }
        };

        if let Some(session) = &session {
            info!(user_id = %session.user_id, "session restored");
            self.cell.set(session.clone(), self.remote.auth_generation());
        }

        let entry = *self.entry.get_or_init(|| {
            if session.is_some() {
                Entry::Home
            } else {
                Entry::Login
            }
        });

        Startup { session, entry }
    }

    /// Entry screen chosen at startup, once `initialize` has run
    pub fn entry(&self) -> Option<Entry> {
        self.entry.get().copied()
    }

    /// Call `on_change` for every session transition until the handle is
    /// released. The local session is updated before `on_change` runs.
    ///
    /// Events that were already queued when this client last logged in or
    /// signed out are skipped.
    pub fn subscribe<F>(&self, on_change: F) -> SubscriptionHandle
    where
        F: Fn(AuthEvent) + Send + Sync + 'static,
    {
        let mut subscription = self.remote.subscribe();
        let cell = Arc::clone(&self.cell);
        let task = tokio::spawn(async move {
            while let Some((seq, event)) = subscription.recv().await {
                if !cell.apply(seq, &event) {
                    debug!(event = event.name(), seq, "skipping stale session transition");
                    continue;
                }
                debug!(event = event.name(), seq, "session transition");
                on_change(event);
            }
        });
        SubscriptionHandle { task: Some(task) }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        require_credentials(email, password)?;

        match bounded(self.request_timeout, self.remote.authenticate(email, password)).await {
            Ok(session) => {
                self.cell.set(session.clone(), self.remote.auth_generation());
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "login failed");
                Err(e.into())
            }
        }
    }

    /// Create an account. The service confirms it out-of-band, so the user
    /// still has to log in afterwards.
    pub async fn register(&self, email: &str, password: &str) -> Result<UserIdentity, StoreError> {
        require_credentials(email, password)?;

        bounded(self.request_timeout, self.remote.register(email, password))
            .await
            .map_err(|e| {
                warn!(error = %e, "sign up failed");
                StoreError::from(e)
            })
    }

    /// Drop the local session, then tell the service. Signing out twice is fine.
    pub async fn sign_out(&self) -> SignOutOutcome {
        if !self.cell.clear(self.remote.auth_generation()) {
            return SignOutOutcome::AlreadySignedOut;
        }

        if let Err(e) = bounded(self.request_timeout, self.remote.sign_out()).await {
            warn!(error = %e, "remote sign out failed; local session already cleared");
        }
        info!("signed out");
        SignOutOutcome::SignedOut
    }

    pub fn current(&self) -> Option<Session> {
        self.cell.current()
    }

    pub fn epoch(&self) -> u64 {
        self.cell.epoch.load(Ordering::SeqCst)
    }

    /// Whether a request started at `epoch` may still touch store state
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }
}

fn require_credentials(email: &str, password: &str) -> Result<(), StoreError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(StoreError::Validation(
            "Enter both email and password.".to_string(),
        ));
    }
    Ok(())
}
