//! The shared cluster secret (Erlang cookie).

use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Permission bits the secret file is normalized to (owner read-only).
pub const SECRET_FILE_MODE: u32 = 0o400;

/// A fingerprint of the cluster secret.
///
/// Only the SHA-256 fingerprint is kept in memory; the secret itself is never
/// logged or stored.
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterSecret {
    fingerprint: String,
    path: PathBuf,
}

impl fmt::Debug for ClusterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSecret")
            .field("path", &self.path)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl ClusterSecret {
    /// Reads the secret file (read-only) and fingerprints it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if it is empty.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Io("failed to read cluster secret", e))?;

        if contents.is_empty() {
            return Err(Error::Config(format!(
                "cluster secret {} is empty",
                path.display()
            )));
        }

        let secret = Self {
            fingerprint: fingerprint(&contents),
            path: path.to_path_buf(),
        };

        debug!("loaded cluster secret {:?}", secret);

        Ok(secret)
    }

    /// Hex SHA-256 of the secret bytes.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Where the secret was read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks the secret against a known-good fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SecretMismatch`] if the fingerprints differ.
    pub fn verify(&self, expected: &str) -> Result<()> {
        if self.fingerprint.eq_ignore_ascii_case(expected.trim()) {
            Ok(())
        } else {
            Err(Error::SecretMismatch {
                expected: expected.trim().to_string(),
                actual: self.fingerprint.clone(),
            })
        }
    }
}

/// Hex SHA-256 of `bytes`.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Restricts the secret file to owner read-only.
///
/// Some platforms and mounts refuse the change while the file still works, so
/// failure is only a warning. Returns whether the file ends up with
/// [`SECRET_FILE_MODE`].
pub async fn normalize_permissions(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();

    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("unable to inspect {}: {}", path.display(), e);
            return false;
        }
    };

    let mode = metadata.permissions().mode() & 0o777;
    if mode == SECRET_FILE_MODE {
        return true;
    }

    match tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(SECRET_FILE_MODE)).await
    {
        Ok(()) => {
            info!(
                "normalized permissions of {} from {:o} to {:o}",
                path.display(),
                mode,
                SECRET_FILE_MODE
            );
            true
        }
        Err(e) => {
            warn!(
                "unable to normalize permissions of {} (continuing): {}",
                path.display(),
                e
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    async fn write_secret(dir: &TempDir, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(".erlang.cookie");
        tokio::fs::write(&path, contents).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_identical_secrets_verify() {
        let dir = TempDir::new().unwrap();
        let path = write_secret(&dir, b"SUPERSECRETCOOKIE").await;

        let secret = ClusterSecret::load(&path).await.unwrap();

        assert_eq!(secret.fingerprint(), fingerprint(b"SUPERSECRETCOOKIE"));
        assert!(secret.verify(&fingerprint(b"SUPERSECRETCOOKIE")).is_ok());
    }

    #[tokio::test]
    async fn test_trailing_newline_is_a_different_secret() {
        let dir = TempDir::new().unwrap();
        let path = write_secret(&dir, b"SUPERSECRETCOOKIE\n").await;

        let secret = ClusterSecret::load(&path).await.unwrap();

        assert!(matches!(
            secret.verify(&fingerprint(b"SUPERSECRETCOOKIE")),
            Err(Error::SecretMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_secret_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = write_secret(&dir, b"").await;

        assert!(matches!(
            ClusterSecret::load(&path).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_secret_is_io_error() {
        let dir = TempDir::new().unwrap();

        assert!(matches!(
            ClusterSecret::load(dir.path().join("missing")).await,
            Err(Error::Io(_, _))
        ));
    }

    #[tokio::test]
    async fn test_normalize_permissions() {
        let dir = TempDir::new().unwrap();
        let path = write_secret(&dir, b"cookie").await;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
            .await
            .unwrap();

        assert!(normalize_permissions(&path).await);

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, SECRET_FILE_MODE);
    }

    #[tokio::test]
    async fn test_normalize_missing_file_is_not_fatal() {
        let dir = TempDir::new().unwrap();

        assert!(!normalize_permissions(dir.path().join("missing")).await);
    }
}
