use crate::keys::PrivateKey;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization/deserialization error: {0}")]
    Serialization(String),
}

/// The device identity issued by the registration service.
///
/// `account_id`, `access_token` and `private_key` are fixed for the life of
/// the identity. Only `license_key` changes, and only when the reconciler
/// adopts the server's latest value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub account_id: String,
    pub access_token: String,
    pub private_key: PrivateKey,
    pub license_key: String,
}

/// Persists the identity as a pretty-printed JSON file so users can inspect
/// (and hand-edit the license key of) their registration.
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the identity, or `None` when no file exists yet.
    pub async fn load(&self) -> Result<Option<AccountIdentity>, StoreError> {
        match fs::read(&self.path).await {
            Ok(data) => serde_json::from_slice(&data)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    pub async fn save(&self, identity: &AccountIdentity) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(identity)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(&self.path, data).await.map_err(StoreError::Io)
    }
}
