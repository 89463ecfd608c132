// SPDX-License-Identifier: MPL-2.0

//! Remote service capability consumed by the stores.
//!
//! The hosted auth and data service is a black box behind [`RemoteService`].
//! [`SupabaseClient`] talks to it over REST; [`MemoryBackend`] keeps the same
//! contract in process.

mod client;
mod events;
mod memory;
mod types;

pub use client::SupabaseClient;
pub use events::{AuthEvent, AuthEvents, AuthSubscription};
pub use memory::MemoryBackend;
pub use types::{
    Filter, NewPost, Order, Post, Profile, Query, Record, Session, UserIdentity, from_record,
    to_record, value_as_text,
};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("no matching row")]
    NotFound,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("request rejected ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Everything the client needs from the hosted backend.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    /// Creates the account. Confirmation happens out-of-band, so no session
    /// is installed.
    async fn register(&self, email: &str, password: &str) -> Result<UserIdentity, BackendError>;

    /// The session restored or established on this client, if any
    async fn current_session(&self) -> Result<Option<Session>, BackendError>;

    async fn current_user(&self) -> Result<Option<UserIdentity>, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Register for session transitions. Dropping the subscription releases it.
    fn subscribe(&self) -> AuthSubscription;

    /// Sequence number of the latest auth event this backend published
    fn auth_generation(&self) -> u64;

    async fn query_records(&self, query: &Query) -> Result<Vec<Record>, BackendError>;

    async fn insert_record(&self, table: &str, record: Record) -> Result<Record, BackendError>;

    async fn upsert_record(
        &self,
        table: &str,
        record: Record,
        conflict_key: &str,
    ) -> Result<Record, BackendError>;
}
