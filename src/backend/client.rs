// SPDX-License-Identifier: MPL-2.0

//! REST adapter for a hosted Supabase project (GoTrue auth + PostgREST data).

use crate::backend::{
    AuthEvent, AuthEvents, AuthSubscription, BackendError, Query, Record, RemoteService, Session,
    UserIdentity,
};
use crate::state::{BackendSettings, SessionError, SessionVault};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
/// PostgREST code for "JSON object requested, multiple (or no) rows returned"
const NO_SINGLE_ROW: &str = "PGRST116";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserIdentity,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| now + chrono::Duration::seconds(secs))
            });

        Session {
            user_id: self.user.id,
            email: self.user.email,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

/// Error payloads differ between the auth and data APIs; accept either shape.
#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn code(&self) -> Option<String> {
        self.error_code.clone().or_else(|| match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    fn message(&self, fallback: &str) -> String {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Map an auth API failure to our taxonomy
fn auth_error(status: StatusCode, body: &str) -> BackendError {
    let parsed = ErrorBody::parse(body);
    let message = parsed.message(status.canonical_reason().unwrap_or("auth request failed"));
    if status.is_server_error() {
        BackendError::Network(message)
    } else {
        BackendError::Auth(message)
    }
}

/// Map a data API failure to our taxonomy
fn rest_error(status: StatusCode, body: &str) -> BackendError {
    let parsed = ErrorBody::parse(body);
    let code = parsed.code();
    let message = parsed.message(status.canonical_reason().unwrap_or("request failed"));

    if code.as_deref() == Some(NO_SINGLE_ROW) && is_zero_rows(&parsed) {
        return BackendError::NotFound;
    }

    match status {
        StatusCode::UNAUTHORIZED => BackendError::NotAuthenticated,
        s if s.is_server_error() => BackendError::Network(message),
        _ => BackendError::Rejected {
            code: code.unwrap_or_else(|| status.as_u16().to_string()),
            message,
        },
    }
}

/// PGRST116 covers both zero and many rows; only zero rows means "absent".
fn is_zero_rows(body: &ErrorBody) -> bool {
    body.details
        .as_deref()
        .is_some_and(|details| details.contains("contains 0 rows"))
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Network(e.to_string())
    }
}

/// Talks to a Supabase project over its public REST endpoints.
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
    session: RwLock<Option<Session>>,
    vault: Arc<dyn SessionVault>,
    events: AuthEvents,
}

impl SupabaseClient {
    /// `request_timeout` bounds every HTTP exchange, connect included.
    pub fn new(
        settings: &BackendSettings,
        vault: Arc<dyn SessionVault>,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut base = settings.url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).map_err(|e| BackendError::InvalidResponse(format!("bad url: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            anon_key: settings.anon_key.clone(),
            session: RwLock::new(None),
            vault,
            events: AuthEvents::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::InvalidResponse(format!("bad endpoint {path}: {e}")))
    }

    /// PostgREST URL for a read: `select=*`, `col=eq.value`, `order=col.desc`
    fn rest_url(&self, query: &Query) -> Result<Url, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{}", query.table))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            for filter in &query.filters {
                pairs.append_pair(&filter.column, &format!("eq.{}", filter.value));
            }
            if let Some(order) = &query.order {
                let direction = if order.ascending { "asc" } else { "desc" };
                pairs.append_pair("order", &format!("{}.{}", order.column, direction));
            }
        }
        Ok(url)
    }

    fn cached_session(&self) -> Option<Session> {
        self.session.read().expect("session lock poisoned").clone()
    }

    /// Bearer is the user's token when signed in, otherwise the anon key.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .cached_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.anon_key.clone());
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn send(request: RequestBuilder) -> Result<Response, BackendError> {
        request.send().await.map_err(transport_error)
    }

    async fn body_text(response: Response) -> String {
        response.text().await.unwrap_or_default()
    }

    async fn install_session(&self, session: Session, event: Option<AuthEvent>) {
        *self.session.write().expect("session lock poisoned") = Some(session.clone());
        if let Err(e) = self.vault.store(&session).await {
            warn!(error = %e, "failed to persist session");
        }
        if let Some(event) = event {
            self.events.publish(event);
        }
    }

    async fn forget_session(&self) {
        self.session.write().expect("session lock poisoned").take();
        if let Err(e) = self.vault.clear().await {
            warn!(error = %e, "failed to clear persisted session");
        }
    }

    async fn token_request(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response = Self::send(
            self.http
                .post(url)
                .header("apikey", &self.anon_key)
                .json(&body),
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(auth_error(status, &Self::body_text(response).await));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Ok(token.into_session(Utc::now()))
    }

    async fn refresh(&self, session: &Session) -> Result<Session, BackendError> {
        debug!("refreshing access token");
        let refreshed = self
            .token_request(
                "refresh_token",
                json!({ "refresh_token": session.refresh_token }),
            )
            .await?;
        self.install_session(
            refreshed.clone(),
            Some(AuthEvent::TokenRefreshed(refreshed.clone())),
        )
        .await;
        Ok(refreshed)
    }

    /// Ask the auth API who owns `token`; `None` when it is no longer accepted.
    async fn fetch_user(&self, token: &str) -> Result<Option<UserIdentity>, BackendError> {
        let response = Self::send(
            self.http
                .get(self.endpoint("auth/v1/user")?)
                .header("apikey", &self.anon_key)
                .bearer_auth(token),
        )
        .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(auth_error(status, &Self::body_text(response).await));
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    /// Bring a session persisted by a previous run back to life, if it still works.
    async fn restore(&self) -> Result<Option<Session>, BackendError> {
        let stored = match self.vault.load().await {
            Ok(session) => session,
            Err(SessionError::NotFound) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "could not read persisted session");
                return Ok(None);
            }
        };

        if !stored.is_expired(Utc::now())
            && self.fetch_user(&stored.access_token).await?.is_some()
        {
            *self.session.write().expect("session lock poisoned") = Some(stored.clone());
            info!("restored previous session");
            return Ok(Some(stored));
        }

        match self.refresh(&stored).await {
            Ok(session) => Ok(Some(session)),
            Err(BackendError::Auth(message)) => {
                info!(reason = %message, "persisted session is no longer valid");
                self.forget_session().await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn rows(response: Response, single: bool) -> Result<Vec<Record>, BackendError> {
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        match value {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::Object(map) => Ok(map),
                    other => Err(BackendError::InvalidResponse(format!(
                        "expected row object, got {other}"
                    ))),
                })
                .collect(),
            serde_json::Value::Object(map) if single => Ok(vec![map]),
            other => Err(BackendError::InvalidResponse(format!(
                "expected rows, got {other}"
            ))),
        }
    }

    async fn write(&self, url: Url, record: Record, prefer: &str) -> Result<Record, BackendError> {
        let response = Self::send(
            self.authorized(self.http.post(url))
                .header("Prefer", prefer)
                .json(&serde_json::Value::Array(vec![serde_json::Value::Object(
                    record,
                )])),
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rest_error(status, &Self::body_text(response).await));
        }

        Self::rows(response, false)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse("write returned no row".to_string()))
    }
}

#[async_trait]
impl RemoteService for SupabaseClient {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let session = self
            .token_request("password", json!({ "email": email, "password": password }))
            .await?;
        info!(user_id = %session.user_id, "signed in");
        self.install_session(session.clone(), Some(AuthEvent::SignedIn(session.clone())))
            .await;
        Ok(session)
    }

    async fn register(&self, email: &str, password: &str) -> Result<UserIdentity, BackendError> {
        let response = Self::send(
            self.http
                .post(self.endpoint("auth/v1/signup")?)
                .header("apikey", &self.anon_key)
                .json(&json!({ "email": email, "password": password })),
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(auth_error(status, &Self::body_text(response).await));
        }

        // With confirmations on the body is the user; otherwise it wraps one.
        let mut body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        let user = match body.get_mut("user") {
            Some(user) => user.take(),
            None => body,
        };
        serde_json::from_value(user).map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        match self.cached_session() {
            Some(session) if session.is_expired(Utc::now()) => {
                self.refresh(&session).await.map(Some)
            }
            Some(session) => Ok(Some(session)),
            None => self.restore().await,
        }
    }

    async fn current_user(&self) -> Result<Option<UserIdentity>, BackendError> {
        match self.current_session().await? {
            Some(session) => self.fetch_user(&session.access_token).await,
            None => Ok(None),
        }
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let Some(session) = self.session.write().expect("session lock poisoned").take() else {
            return Ok(());
        };

        // Local state goes first, so a slow or dropped logout call leaves
        // nothing behind.
        self.forget_session().await;
        self.events.publish(AuthEvent::SignedOut);

        let response = Self::send(
            self.http
                .post(self.endpoint("auth/v1/logout")?)
                .header("apikey", &self.anon_key)
                .bearer_auth(&session.access_token),
        )
        .await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(auth_error(status, &Self::body_text(response).await))
        }
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    fn auth_generation(&self) -> u64 {
        self.events.generation()
    }

    async fn query_records(&self, query: &Query) -> Result<Vec<Record>, BackendError> {
        let url = self.rest_url(query)?;
        debug!(table = %query.table, single = query.single, "query");

        let mut request = self.authorized(self.http.get(url));
        if query.single {
            request = request.header("Accept", SINGLE_OBJECT);
        }
        let response = Self::send(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rest_error(status, &Self::body_text(response).await));
        }

        Self::rows(response, query.single).await
    }

    async fn insert_record(&self, table: &str, record: Record) -> Result<Record, BackendError> {
        debug!(table, "insert");
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        self.write(url, record, "return=representation").await
    }

    async fn upsert_record(
        &self,
        table: &str,
        record: Record,
        conflict_key: &str,
    ) -> Result<Record, BackendError> {
        debug!(table, conflict_key, "upsert");
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        url.query_pairs_mut().append_pair("on_conflict", conflict_key);
        self.write(url, record, "resolution=merge-duplicates,return=representation")
            .await
    }
}
