// SPDX-License-Identifier: MPL-2.0

//! In-process backend with the same contract as the hosted service.

use crate::backend::{
    AuthEvent, AuthEvents, AuthSubscription, BackendError, Query, Record, RemoteService, Session,
    UserIdentity, value_as_text,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Account {
    user_id: String,
    password: String,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    tables: HashMap<String, Vec<Record>>,
    next_id: u64,
    last_created_at: Option<DateTime<Utc>>,
}

/// Accounts, one session and a set of tables, all held in memory.
///
/// Counts every call so callers can assert that no request was made, and
/// can be told to fail upcoming calls.
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    events: AuthEvents,
    calls: AtomicUsize,
    failures: Mutex<VecDeque<BackendError>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            events: AuthEvents::new(),
            calls: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory backend lock poisoned")
    }

    /// Create a confirmed account and return its user id
    pub fn add_account(&self, email: &str, password: &str) -> String {
        let mut inner = self.inner();
        inner.next_id += 1;
        let user_id = format!("user-{}", inner.next_id);
        inner.accounts.insert(
            email.to_string(),
            Account {
                user_id: user_id.clone(),
                password: password.to_string(),
            },
        );
        user_id
    }

    /// Pretend a session survived from a previous run
    pub fn restore_session(&self, session: Session) {
        self.inner().session = Some(session);
    }

    pub fn seed(&self, table: &str, record: Record) {
        self.inner()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.inner().tables.get(table).cloned().unwrap_or_default()
    }

    /// Number of remote calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the next call fail with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, error: BackendError) {
        self.failures
            .lock()
            .expect("memory backend lock poisoned")
            .push_back(error);
    }

    /// Auth listeners currently registered
    pub fn listener_count(&self) -> usize {
        self.events.listener_count()
    }

    /// Simulate the service revoking the session from elsewhere
    pub fn expire_session(&self) {
        let had_session = self.inner().session.take().is_some();
        if had_session {
            self.events.publish(AuthEvent::SignedOut);
        }
    }

    /// Simulate the service rotating the session's tokens
    pub fn refresh_session(&self, session: Session) {
        self.inner().session = Some(session.clone());
        self.events.publish(AuthEvent::TokenRefreshed(session));
    }

    fn begin_call(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self
            .failures
            .lock()
            .expect("memory backend lock poisoned")
            .pop_front()
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn require_session(inner: &Inner) -> Result<(), BackendError> {
        inner
            .session
            .as_ref()
            .map(|_| ())
            .ok_or(BackendError::NotAuthenticated)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Strictly increasing so rows inserted in the same instant still sort.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_created_at {
            if now <= last {
                now = last + chrono::Duration::microseconds(1);
            }
        }
        self.last_created_at = Some(now);
        now
    }
}

fn compare_values(a: Option<&serde_json::Value>, b: Option<&serde_json::Value>) -> CmpOrdering {
    use serde_json::Value;

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
}

#[async_trait]
impl RemoteService for MemoryBackend {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.begin_call()?;
        let session = {
            let mut inner = self.inner();
            let account = inner
                .accounts
                .get(email)
                .filter(|a| a.password == password)
                .ok_or_else(|| BackendError::Auth("Invalid login credentials".to_string()))?;

            let user_id = account.user_id.clone();
            inner.next_id += 1;
            let session = Session {
                user_id,
                email: Some(email.to_string()),
                access_token: format!("memory-access-{}", inner.next_id),
                refresh_token: format!("memory-refresh-{}", inner.next_id),
                expires_at: None,
            };
            inner.session = Some(session.clone());
            session
        };

        self.events.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn register(&self, email: &str, password: &str) -> Result<UserIdentity, BackendError> {
        self.begin_call()?;
        if email.is_empty() || password.is_empty() {
            return Err(BackendError::Auth(
                "Signup requires a valid password".to_string(),
            ));
        }
        if self.inner().accounts.contains_key(email) {
            return Err(BackendError::Auth("User already registered".to_string()));
        }

        let id = self.add_account(email, password);
        Ok(UserIdentity {
            id,
            email: Some(email.to_string()),
        })
    }

    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        self.begin_call()?;
        Ok(self.inner().session.clone())
    }

    async fn current_user(&self) -> Result<Option<UserIdentity>, BackendError> {
        self.begin_call()?;
        Ok(self.inner().session.as_ref().map(Session::identity))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        // The client side forgets the session even when the call fails.
        let had_session = self.inner().session.take().is_some();
        if had_session {
            self.events.publish(AuthEvent::SignedOut);
        }
        self.begin_call()
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    fn auth_generation(&self) -> u64 {
        self.events.generation()
    }

    async fn query_records(&self, query: &Query) -> Result<Vec<Record>, BackendError> {
        self.begin_call()?;
        let inner = self.inner();
        let mut rows: Vec<Record> = inner
            .tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending { ord } else { ord.reverse() }
            });
        }

        if query.single {
            return match rows.len() {
                0 => Err(BackendError::NotFound),
                1 => Ok(rows),
                n => Err(BackendError::Rejected {
                    code: "PGRST116".to_string(),
                    message: format!("{n} rows returned for a single-row query"),
                }),
            };
        }

        Ok(rows)
    }

    async fn insert_record(&self, table: &str, mut record: Record) -> Result<Record, BackendError> {
        self.begin_call()?;
        let mut inner = self.inner();
        Self::require_session(&inner)?;

        if !record.contains_key("id") {
            inner.next_id += 1;
            record.insert("id".to_string(), serde_json::Value::from(inner.next_id));
        }
        if !record.contains_key("created_at") {
            let created_at = inner
                .next_created_at()
                .to_rfc3339_opts(SecondsFormat::Micros, true);
            record.insert("created_at".to_string(), serde_json::Value::from(created_at));
        }

        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn upsert_record(
        &self,
        table: &str,
        record: Record,
        conflict_key: &str,
    ) -> Result<Record, BackendError> {
        self.begin_call()?;
        let mut inner = self.inner();
        Self::require_session(&inner)?;

        let key = record
            .get(conflict_key)
            .and_then(value_as_text)
            .ok_or_else(|| BackendError::Rejected {
                code: "42P10".to_string(),
                message: format!("missing conflict column {conflict_key}"),
            })?;

        let rows = inner.tables.entry(table.to_string()).or_default();
        let existing = rows.iter().position(|row| {
            row.get(conflict_key).and_then(value_as_text).as_deref() == Some(key.as_str())
        });

        match existing {
            Some(index) => {
                let row = &mut rows[index];
                for (column, value) in record {
                    row.insert(column, value);
                }
                Ok(row.clone())
            }
            None => {
                rows.push(record.clone());
                Ok(record)
            }
        }
    }
}
