//! File-backed cache of session credentials.
//!
//! One JSON file per account, named after the account's long-lived access
//! key id: `{root}/{access_key_id}.json`. Records are replaced wholesale on
//! every store and deleted as soon as a lookup finds them stale.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, info};

use crate::{
    aws::Credentials,
    error::{MfaError, Result},
};

/// File permissions for cache files (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

#[derive(Debug, Clone)]
pub struct CredentialCache {
    root: PathBuf,
}

impl CredentialCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record for `identity_key`.
    pub fn path_for(&self, identity_key: &str) -> PathBuf {
        self.root.join(format!("{identity_key}.json"))
    }

    /// Look up fresh credentials for `identity_key`.
    ///
    /// Returns `Ok(None)` when no record exists or the record expires within
    /// the safety margin; stale records are removed before returning.
    pub async fn lookup(&self, identity_key: &str) -> Result<Option<Credentials>> {
        let path = self.path_for(identity_key);
        debug!("Reading credentials from {}", path.display());

        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Credentials not found");
                return Ok(None);
            }
            Err(source) => return Err(MfaError::CacheIo { path, source }),
        };

        let creds: Credentials = serde_json::from_slice(&raw)
            .map_err(|source| MfaError::CacheFormat {
                path: path.clone(),
                source,
            })?;

        let now = Utc::now();
        if creds.is_fresh_at(now) {
            debug!(
                "Credentials present and not out of date: valid for {}",
                humantime::format_duration(std::time::Duration::from_secs(
                    (creds.expiration - now).num_seconds().max(0) as u64
                ))
            );
            return Ok(Some(creds));
        }

        info!("Cached credentials out of date, removing {}", path.display());
        match fs::remove_file(&path).await {
            Ok(()) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(MfaError::CacheIo { path, source }),
        }
    }

    /// Persist `creds` for `identity_key`, replacing any previous record.
    ///
    /// The record is written to a sibling temp file and renamed into place so
    /// readers never see a partial file.
    pub async fn store(&self, identity_key: &str, creds: &Credentials) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.path_for(identity_key);
        let tmp = self
            .root
            .join(format!(".{identity_key}.json.{}.tmp", std::process::id()));

        let body = serde_json::to_vec(creds).map_err(|source| MfaError::CacheFormat {
            path: path.clone(),
            source,
        })?;

        write_private(&tmp, &body)
            .await
            .map_err(|source| MfaError::CacheIo {
                path: tmp.clone(),
                source,
            })?;

        if let Err(source) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(MfaError::CacheIo { path, source });
        }

        debug!("Credentials cached at {}", path.display());
        Ok(())
    }

    async fn ensure_dir(&self) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(DIR_MODE);

        builder
            .create(&self.root)
            .await
            .map_err(|source| MfaError::CacheIo {
                path: self.root.clone(),
                source,
            })
    }
}

async fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);

    let mut file = options.open(path).await?;
    file.write_all(body).await?;
    file.flush().await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta};

    fn creds(expiration: DateTime<Utc>) -> Credentials {
        Credentials {
            access_key_id: "ASIATEMP".to_string(),
            secret_access_key: "temp-secret".to_string(),
            session_token: "temp-token".to_string(),
            expiration,
        }
    }

    #[tokio::test]
    async fn test_lookup_missing_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(dir.path());
        assert!(cache.lookup("AKIAACME").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(dir.path().join("nested").join("aws"));
        let c = creds(Utc::now() + TimeDelta::hours(6));

        cache.store("AKIAACME", &c).await.unwrap();

        assert!(cache.path_for("AKIAACME").exists());
        assert_eq!(cache.lookup("AKIAACME").await.unwrap(), Some(c));
    }

    #[tokio::test]
    async fn test_fresh_record_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(dir.path());
        cache
            .store("AKIAACME", &creds(Utc::now() + TimeDelta::minutes(5)))
            .await
            .unwrap();

        assert!(cache.lookup("AKIAACME").await.unwrap().is_some());
        assert!(cache.path_for("AKIAACME").exists());
    }

    #[tokio::test]
    async fn test_stale_record_is_miss_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(dir.path());

        for expiration in [
            Utc::now() + TimeDelta::seconds(30),
            Utc::now() - TimeDelta::hours(2),
        ] {
            cache.store("AKIAACME", &creds(expiration)).await.unwrap();
            assert!(cache.lookup("AKIAACME").await.unwrap().is_none());
            assert!(!cache.path_for("AKIAACME").exists());
        }
    }

    #[tokio::test]
    async fn test_malformed_record_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(dir.path());
        std::fs::write(cache.path_for("AKIAACME"), b"{not json").unwrap();

        let err = cache.lookup("AKIAACME").await.unwrap_err();
        assert!(matches!(err, MfaError::CacheFormat { .. }));
    }

    #[tokio::test]
    async fn test_reads_sts_style_record() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(dir.path());
        std::fs::write(
            cache.path_for("AKIAACME"),
            br#"{"AccessKeyId":"ASIA1","SecretAccessKey":"s","SessionToken":"t","Expiration":"2999-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let found = cache.lookup("AKIAACME").await.unwrap().unwrap();
        assert_eq!(found.access_key_id, "ASIA1");
    }

    #[tokio::test]
    async fn test_keys_are_partitioned() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(dir.path());
        cache
            .store("AKIAONE", &creds(Utc::now() + TimeDelta::hours(1)))
            .await
            .unwrap();

        assert!(cache.lookup("AKIATWO").await.unwrap().is_none());
        assert!(cache.lookup("AKIAONE").await.unwrap().is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_store_uses_private_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("aws");
        let cache = CredentialCache::new(&root);
        cache
            .store("AKIAACME", &creds(Utc::now() + TimeDelta::hours(1)))
            .await
            .unwrap();

        let file_mode = std::fs::metadata(cache.path_for("AKIAACME"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, FILE_MODE);
        let dir_mode = std::fs::metadata(&root).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, DIR_MODE);
    }
}
