// SPDX-License-Identifier: MPL-2.0

use crate::backend::BackendError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// A row as the data service returns it: a JSON object keyed by column.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Decoupled from the auth service's wire format so we own the API boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    /// When the access token stops being accepted, if the service said so
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.user_id.clone(),
            email: self.email.clone(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Equality filter on a single column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Read request against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    /// Expect exactly one row; zero rows is reported as `BackendError::NotFound`
    pub single: bool,
}

impl Query {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filters: Vec::new(),
            order: None,
            single: false,
        }
    }

    pub fn eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// Whether a row satisfies every filter of this query
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| {
            record
                .get(&f.column)
                .is_some_and(|v| value_as_text(v).as_deref() == Some(f.value.as_str()))
        })
    }
}

/// Text form of a scalar column, as it would appear in a filter
pub fn value_as_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Post {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(rename = "user_id")]
    pub author_user_id: String,
    #[serde(rename = "username", default, deserialize_with = "null_as_default")]
    pub author_display_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub caption: String,
    #[serde(rename = "likes", default, deserialize_with = "null_as_default")]
    pub like_count: u32,
    #[serde(rename = "comments", default, deserialize_with = "null_as_default")]
    pub comment_count: u32,
    #[serde(rename = "reposts", default, deserialize_with = "null_as_default")]
    pub repost_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new post; the service assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPost {
    pub caption: String,
    pub likes: u32,
    pub comments: u32,
    pub reposts: u32,
    pub user_id: String,
    pub username: String,
}

impl NewPost {
    pub fn new(caption: &str, author: &UserIdentity, display_name: &str) -> Self {
        Self {
            caption: caption.to_string(),
            likes: 0,
            comments: 0,
            reposts: 0,
            user_id: author.id.clone(),
            username: display_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    /// Display name shown on posts and the profile screen
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bio: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub avatar_url: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// The shape shown before a user has ever saved their profile
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Self::default()
        }
    }
}

pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T, BackendError> {
    serde_json::from_value(serde_json::Value::Object(record))
        .map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

pub fn to_record<T: Serialize>(value: &T) -> Result<Record, BackendError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(BackendError::InvalidResponse(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(BackendError::InvalidResponse(e.to_string())),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Row ids arrive as bigint numbers or uuid strings depending on the table.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    value_as_text(&value).ok_or_else(|| serde::de::Error::custom("id must be a string or number"))
}
