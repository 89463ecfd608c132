// SPDX-License-Identifier: MPL-2.0

//! Session transition notifications.
//!
//! Every backend owns an [`AuthEvents`] hub. Listeners hold an
//! [`AuthSubscription`]; dropping it unregisters the listener.
//!
//! Each published event carries a sequence number. Consumers compare it
//! against [`AuthEvents::generation`] to tell events that were already
//! queued before a local transition from ones that came after.

use crate::backend::Session;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

impl AuthEvent {
    /// The session that is active after this transition
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthEvent::SignedIn(s) | AuthEvent::TokenRefreshed(s) => Some(s),
            AuthEvent::SignedOut => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn(_) => "signed_in",
            AuthEvent::SignedOut => "signed_out",
            AuthEvent::TokenRefreshed(_) => "token_refreshed",
        }
    }
}

/// Broadcast hub for auth transitions.
#[derive(Clone)]
pub struct AuthEvents {
    sender: broadcast::Sender<(u64, AuthEvent)>,
    listeners: Arc<AtomicUsize>,
    sequence: Arc<AtomicU64>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            listeners: Arc::new(AtomicUsize::new(0)),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn publish(&self, event: AuthEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(event = event.name(), seq, "auth state changed");
        // No receivers is fine: nobody is mounted to care.
        let _ = self.sender.send((seq, event));
    }

    /// Sequence number of the latest published event, 0 before the first
    pub fn generation(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> AuthSubscription {
        self.listeners.fetch_add(1, Ordering::SeqCst);
        AuthSubscription {
            receiver: self.sender.subscribe(),
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Number of live subscriptions
    pub fn listener_count(&self) -> usize {
        self.listeners.load(Ordering::SeqCst)
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered auth listener. Unregisters when dropped.
pub struct AuthSubscription {
    receiver: broadcast::Receiver<(u64, AuthEvent)>,
    listeners: Arc<AtomicUsize>,
}

impl AuthSubscription {
    /// Next transition and its sequence number, or `None` once the backend
    /// is gone.
    pub async fn recv(&mut self) -> Option<(u64, AuthEvent)> {
        loop {
            match self.receiver.recv().await {
                Ok(stamped) => return Some(stamped),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "auth listener lagged, events dropped");
                    continue;
                }
            }
        }
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.listeners.fetch_sub(1, Ordering::SeqCst);
    }
}
