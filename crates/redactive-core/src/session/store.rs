use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::CredentialRecord;
use crate::auth::random_state;
use crate::config::{ConfigError, ConfigLocator};

/// Errors raised by credential store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("credential backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap an error from an application-supplied backend.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        StoreError::Backend(err.into())
    }
}

/// Per-user credential persistence supplied by the embedding application.
///
/// Writing `None` clears the user's record. Implementations must tolerate clearing a
/// record that does not exist.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn read(&self, user_id: &str) -> Result<Option<CredentialRecord>, StoreError>;
    async fn write(
        &self,
        user_id: &str,
        record: Option<&CredentialRecord>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<T> CredentialStore for Arc<T>
where
    T: CredentialStore + ?Sized,
{
    async fn read(&self, user_id: &str) -> Result<Option<CredentialRecord>, StoreError> {
        (**self).read(user_id).await
    }

    async fn write(
        &self,
        user_id: &str,
        record: Option<&CredentialRecord>,
    ) -> Result<(), StoreError> {
        (**self).write(user_id, record).await
    }
}

/// Process-local store, mostly useful for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<String, CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn read(&self, user_id: &str) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn write(
        &self,
        user_id: &str,
        record: Option<&CredentialRecord>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        match record {
            Some(record) => {
                records.insert(user_id.to_owned(), record.clone());
            }
            None => {
                records.remove(user_id);
            }
        }
        Ok(())
    }
}

/// Filesystem-backed store keeping one JSON file per user.
///
/// File names are derived from a SHA-256 digest of the user id, so arbitrary ids are safe.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(locator: &ConfigLocator) -> Self {
        Self {
            dir: locator.credentials_dir(),
        }
    }

    pub fn with_default_locator() -> Result<Self, StoreError> {
        Ok(Self::new(&ConfigLocator::new()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, user_id: &str) -> PathBuf {
        let digest = Sha256::digest(user_id.as_bytes());
        let name: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        self.dir.join(format!("{name}.json"))
    }

    // Readers only ever see a complete record; the sibling temp file is created 0600.
    async fn write_file(path: &Path, payload: &str) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension(format!("{}.tmp", random_state(8)));

        let result = match Self::write_new_file(&tmp_path, payload).await {
            Ok(()) => fs::rename(&tmp_path, path).await.map_err(StoreError::from),
            Err(err) => Err(err),
        };
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result
    }

    async fn write_new_file(path: &Path, payload: &str) -> Result<(), StoreError> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(path).await?;
        file.write_all(payload.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn read(&self, user_id: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let path = self.record_path(user_id);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let envelope: RecordEnvelope = serde_json::from_str(&raw)?;
        Ok(Some(envelope.record))
    }

    async fn write(
        &self,
        user_id: &str,
        record: Option<&CredentialRecord>,
    ) -> Result<(), StoreError> {
        let path = self.record_path(user_id);
        match record {
            Some(record) => {
                let envelope = RecordEnvelope {
                    version: 1,
                    user_id: user_id.to_owned(),
                    record: record.clone(),
                };
                let payload = serde_json::to_string_pretty(&envelope)?;
                Self::write_file(&path, &payload).await
            }
            None => match fs::remove_file(path).await {
                Ok(_) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordEnvelope {
    version: u32,
    user_id: String,
    record: CredentialRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn sample_record() -> CredentialRecord {
        CredentialRecord {
            sign_in_state: None,
            refresh_token: Some("refresh".into()),
            id_token: Some("token".into()),
            id_token_expiry: Some(Utc::now() + Duration::minutes(5)),
            connections: vec!["confluence".into()],
        }
    }

    fn file_store(temp_dir: &TempDir) -> FileCredentialStore {
        let locator = ConfigLocator::with_root(temp_dir.path()).unwrap();
        FileCredentialStore::new(&locator)
    }

    #[tokio::test]
    async fn file_round_trip_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let store = file_store(&temp_dir);
        let record = sample_record();
        store.write("user/with:odd chars", Some(&record)).await.unwrap();
        let loaded = store.read("user/with:odd chars").await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(store.read("someone-else").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_clear_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let store = file_store(&temp_dir);
        store.write("missing", None).await.unwrap();
        store.write("missing", None).await.unwrap();
        assert!(store.read("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_clear_removes_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = file_store(&temp_dir);
        store.write("user-1", Some(&sample_record())).await.unwrap();
        store.write("user-1", None).await.unwrap();
        assert!(store.read("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_overwrite_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = file_store(&temp_dir);
        let long = CredentialRecord {
            connections: (0..50).map(|i| format!("provider-{i}")).collect(),
            ..sample_record()
        };
        store.write("user-1", Some(&long)).await.unwrap();
        let short = CredentialRecord {
            sign_in_state: Some("s".into()),
            ..Default::default()
        };
        store.write("user-1", Some(&short)).await.unwrap();

        assert_eq!(store.read("user-1").await.unwrap(), Some(short));
        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_user_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = file_store(&temp_dir);
        store.write("user-1", Some(&sample_record())).await.unwrap();
        let metadata = std::fs::metadata(store.record_path("user-1")).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[tokio::test]
    async fn memory_store_overwrites_and_clears() {
        let store = MemoryCredentialStore::new();
        store.write("user-1", Some(&sample_record())).await.unwrap();
        let replacement = CredentialRecord {
            sign_in_state: Some("s".into()),
            ..Default::default()
        };
        store.write("user-1", Some(&replacement)).await.unwrap();
        assert_eq!(store.read("user-1").await.unwrap(), Some(replacement));
        store.write("user-1", None).await.unwrap();
        assert!(store.is_empty().await);
    }
}
