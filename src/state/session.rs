// SPDX-License-Identifier: MPL-2.0

use crate::backend::Session;
use crate::config::APP_ID;
use async_trait::async_trait;
use secret_service::{Collection, EncryptionType, SecretService};
use std::sync::Mutex;
use thiserror::Error;

const SECRET_LABEL: &str = "FaxThat Session";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("secret service unavailable: {0}")]
    SecretService(String),
    #[error("session not found")]
    NotFound,
    #[error("invalid session data: {0}")]
    InvalidData(String),
}

/// Where the signed-in session survives between runs.
#[async_trait]
pub trait SessionVault: Send + Sync {
    async fn store(&self, session: &Session) -> Result<(), SessionError>;
    async fn load(&self) -> Result<Session, SessionError>;
    async fn clear(&self) -> Result<(), SessionError>;
}

/// Persists session credentials via libsecret.
pub struct SecretServiceVault;

fn secret_err(e: secret_service::Error) -> SessionError {
    SessionError::SecretService(e.to_string())
}

async fn unlock(collection: &Collection<'_>) -> Result<(), SessionError> {
    if collection.is_locked().await.unwrap_or(true) {
        collection.unlock().await.map_err(secret_err)?;
    }
    Ok(())
}

#[async_trait]
impl SessionVault for SecretServiceVault {
    async fn store(&self, session: &Session) -> Result<(), SessionError> {
        let session_json =
            serde_json::to_string(session).map_err(|e| SessionError::InvalidData(e.to_string()))?;

        let ss = SecretService::connect(EncryptionType::Dh)
            .await
            .map_err(secret_err)?;
        let collection = ss.get_default_collection().await.map_err(secret_err)?;
        unlock(&collection).await?;

        let attributes = vec![("application", APP_ID), ("user_id", session.user_id.as_str())];
        collection
            .create_item(
                SECRET_LABEL,
                attributes.into_iter().collect(),
                session_json.as_bytes(),
                true, // replace existing
                "text/plain",
            )
            .await
            .map_err(secret_err)?;

        Ok(())
    }

    async fn load(&self) -> Result<Session, SessionError> {
        let ss = SecretService::connect(EncryptionType::Dh)
            .await
            .map_err(secret_err)?;
        let collection = ss.get_default_collection().await.map_err(secret_err)?;
        unlock(&collection).await?;

        let attributes = vec![("application", APP_ID)];
        let items = collection
            .search_items(attributes.into_iter().collect())
            .await
            .map_err(secret_err)?;

        let item = items.first().ok_or(SessionError::NotFound)?;
        let secret = item.get_secret().await.map_err(secret_err)?;

        serde_json::from_slice(&secret).map_err(|e| SessionError::InvalidData(e.to_string()))
    }

    async fn clear(&self) -> Result<(), SessionError> {
        let ss = SecretService::connect(EncryptionType::Dh)
            .await
            .map_err(secret_err)?;
        let collection = ss.get_default_collection().await.map_err(secret_err)?;
        unlock(&collection).await?;

        let attributes = vec![("application", APP_ID)];
        let items = collection
            .search_items(attributes.into_iter().collect())
            .await
            .map_err(secret_err)?;

        for item in items {
            item.delete().await.map_err(secret_err)?;
        }

        Ok(())
    }
}

/// Keeps the session only for the life of the process.
#[derive(Default)]
pub struct MemoryVault {
    session: Mutex<Option<Session>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionVault for MemoryVault {
    async fn store(&self, session: &Session) -> Result<(), SessionError> {
        *self.session.lock().expect("vault lock poisoned") = Some(session.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Session, SessionError> {
        self.session
            .lock()
            .expect("vault lock poisoned")
            .clone()
            .ok_or(SessionError::NotFound)
    }

    async fn clear(&self) -> Result<(), SessionError> {
        self.session.lock().expect("vault lock poisoned").take();
        Ok(())
    }
}
