use minechat_core::Credential;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Same shape as the server's registration reply, so a saved reply can be
/// dropped in as the store file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub nickname: String,
    pub account_hash: String,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("credential store {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no token known: pass --key, or --user-name to register a new account")]
    Missing,
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<StoredCredential>, CredentialError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CredentialError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| CredentialError::Malformed {
                path: self.path.clone(),
                source,
            })
    }

    pub async fn save(&self, credential: &StoredCredential) -> Result<(), CredentialError> {
        let io_err = |source| CredentialError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let mut encoded = serde_json::to_vec_pretty(credential).map_err(|source| {
            CredentialError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;
        encoded.push(b'\n');
        fs::write(&self.path, encoded).await.map_err(io_err)?;
        info!(event = "credential_saved", path = %self.path.display(), nickname = %credential.nickname);
        Ok(())
    }
}

/// `--key` first, then the store, then registration under `--user-name`.
pub async fn resolve_credential(
    key: Option<&str>,
    user_name: Option<&str>,
    store: &CredentialStore,
) -> Result<Credential, CredentialError> {
    if let Some(key) = key.filter(|key| !key.trim().is_empty()) {
        return Ok(Credential::with_token(key));
    }
    if let Some(stored) = store.load().await? {
        return Ok(Credential {
            token: Some(stored.account_hash),
            nickname: Some(stored.nickname),
        });
    }
    match user_name.filter(|name| !name.trim().is_empty()) {
        Some(name) => Ok(Credential::register(name)),
        None => Err(CredentialError::Missing),
    }
}
